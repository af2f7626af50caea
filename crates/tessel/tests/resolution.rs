use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tessel::compiler::Compiler;
use tessel::syntax::{Node, ParserState, Token, TokenKind, TokenParser};
use tessel::{ArrayLoader, Candidate, Environment, EnvironmentOptions, Error, Extension};

fn env_with(templates: &[(&str, &str)]) -> Environment {
    Environment::new(templates.iter().copied().collect::<ArrayLoader>())
}

#[test]
fn test_first_available_skips_missing() {
    let env = env_with(&[("b.tsl", "B")]);
    let unit = env
        .resolve_first_available(["missing.tsl", "b.tsl"])
        .unwrap();
    assert_eq!(unit.template_name(), "b.tsl");
}

#[test]
fn test_first_available_single_candidate_keeps_its_error() {
    let env = env_with(&[]);
    let err = env.resolve_first_available(["missing.tsl"]).unwrap_err();
    let payload = err.template_error().unwrap();
    assert!(err.is_loader_error());
    assert_eq!(payload.message(), "Template \"missing.tsl\" is not defined.");
}

#[test]
fn test_first_available_several_candidates_aggregate() {
    let env = env_with(&[]);
    let err = env
        .resolve_first_available(["one.tsl", "two.tsl"])
        .unwrap_err();
    assert!(err.is_loader_error());
    assert_eq!(
        err.template_error().unwrap().message(),
        "Unable to find one of the following templates: \"one.tsl\", \"two.tsl\"."
    );
}

#[test]
fn test_first_available_propagates_syntax_errors() {
    let env = env_with(&[("broken.tsl", "{{ x|nope }}"), ("ok.tsl", "fine")]);
    let err = env
        .resolve_first_available(["broken.tsl", "ok.tsl"])
        .unwrap_err();
    assert!(matches!(err, Error::Syntax(_)));
}

#[test]
fn test_first_available_returns_loaded_units_as_is() {
    let env = env_with(&[("a.tsl", "A")]);
    let loaded = env.resolve_unit("a.tsl", None).unwrap();
    let unit = env
        .resolve_first_available(vec![
            Candidate::from("missing.tsl"),
            Candidate::from(Arc::clone(&loaded)),
        ])
        .unwrap();
    assert!(Arc::ptr_eq(&unit, &loaded));
}

/// `{% sandbox %}…{% endsandbox %}` compiles its body into an embedded unit.
struct SandboxTag;

#[derive(Debug)]
struct SandboxNode {
    index: usize,
    line: usize,
}

impl Node for SandboxNode {
    fn compile(&self, compiler: &mut Compiler<'_>) -> tessel::Result<()> {
        compiler
            .add_debug_info(self)
            .write(&format!("echo render_embedded(env, context, {});\n", self.index));
        Ok(())
    }

    fn line(&self) -> usize {
        self.line
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl TokenParser for SandboxTag {
    fn tag(&self) -> &str {
        "sandbox"
    }

    fn parse(&self, token: Token, parser: &mut ParserState<'_>) -> tessel::Result<Box<dyn Node>> {
        parser.stream().expect(TokenKind::BlockEnd, None)?;
        let (body, _) = parser.subparse(&["endsandbox"])?;
        parser.stream().expect(TokenKind::BlockEnd, None)?;
        let index = parser.embed(body);
        Ok(Box::new(SandboxNode {
            index,
            line: token.line,
        }))
    }
}

#[test]
fn test_embedded_units_share_the_template_source() {
    let cache = tempfile::tempdir().unwrap();
    let loader: ArrayLoader = [(
        "page.tsl",
        "top {% sandbox %}inner {{ x }}{% endsandbox %}{% sandbox %}two{% endsandbox %}",
    )]
    .into_iter()
    .collect();
    let options = EnvironmentOptions {
        cache: Some(cache.path().to_path_buf()),
        ..Default::default()
    };
    let mut env = Environment::with_options(loader, options);
    env.add_token_parser(SandboxTag).unwrap();

    let top = env.resolve_unit("page.tsl", None).unwrap();
    let first = env.resolve_unit("page.tsl", Some(1)).unwrap();
    let second = env.resolve_unit("page.tsl", Some(2)).unwrap();

    assert_eq!(first.name().to_string(), format!("{}_1", top.name()));
    assert_eq!(second.name().base(), *top.name());
    assert_eq!(first.cache_path(), top.cache_path());
    assert!(top.source().contains("echo render_embedded(env, context, 1);"));
    assert!(top.source().contains(&format!("unit {} extends Unit {{", second.name())));

    let err = env.resolve_unit("page.tsl", Some(3)).unwrap_err();
    assert!(matches!(err, Error::Runtime(_)));
}

struct Counting {
    calls: Arc<AtomicUsize>,
}

impl Extension for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    fn init_runtime(&self, env: &Environment) -> tessel::Result<()> {
        assert!(env.is_initialized());
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_runtime_initialized_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut env = env_with(&[("a.tsl", "A"), ("b.tsl", "B")]);
    env.add_extension(Counting {
        calls: Arc::clone(&calls),
    })
    .unwrap();

    env.resolve_unit("a.tsl", None).unwrap();
    env.resolve_unit("b.tsl", None).unwrap();
    env.create_template("inline").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_missing_template_is_loader_error() {
    let env = env_with(&[]);
    let err = env.resolve_unit("nowhere.tsl", None).unwrap_err();
    assert!(err.is_loader_error());
}

#[test]
fn test_extension_lookup() {
    let mut env = env_with(&[]);
    env.add_extension(Counting {
        calls: Arc::new(AtomicUsize::new(0)),
    })
    .unwrap();
    assert_eq!(env.extension("counting").unwrap().name(), "counting");
    assert!(env.remove_extension("counting").unwrap().is_some());
    assert!(matches!(env.extension("counting"), Err(Error::Runtime(_))));
}

#[test]
fn test_duplicate_extension_is_rejected() {
    let mut env = env_with(&[]);
    let calls = Arc::new(AtomicUsize::new(0));
    env.add_extension(Counting {
        calls: Arc::clone(&calls),
    })
    .unwrap();
    let err = env.add_extension(Counting { calls }).unwrap_err();
    assert!(matches!(err, Error::Logic(_)));
}

struct ListGlobals;

impl Extension for ListGlobals {
    fn name(&self) -> &str {
        "list_globals"
    }

    fn globals(&self) -> serde_json::Value {
        serde_json::json!(["not", "a", "map"])
    }
}

#[test]
fn test_malformed_globals_fail_before_first_compile() {
    let mut env = env_with(&[("a.tsl", "A")]);
    env.add_extension(ListGlobals).unwrap();

    let err = env.resolve_unit("a.tsl", None).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(matches!(env.init_runtime(), Err(Error::Configuration(_))));
    assert!(!env.is_initialized());
}
