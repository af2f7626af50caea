use std::collections::BTreeMap;

use tessel::syntax::{Lexer, TokenStream};
use tessel::{ArrayLoader, Autoescape, Environment, EnvironmentOptions, Error, Filter};

fn env_with(templates: &[(&str, &str)]) -> Environment {
    Environment::new(templates.iter().copied().collect::<ArrayLoader>())
}

/// Reads the `output line => source line` map back out of a compiled unit.
fn debug_map(source: &str) -> BTreeMap<usize, usize> {
    let lines: Vec<&str> = source.lines().collect();
    let header = lines
        .iter()
        .position(|line| line.trim() == "fn debug_info() {")
        .unwrap();
    let body = lines[header + 1]
        .trim()
        .trim_start_matches("return [")
        .trim_end_matches("];");
    body.split(", ")
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (output, source) = entry.split_once(" => ").unwrap();
            (output.parse().unwrap(), source.parse().unwrap())
        })
        .collect()
}

#[test]
fn test_compile_source_is_idempotent() {
    let source = "{% set title = 'Docs' %}\n<h1>{{ title|upper }}</h1>\n{% if user %}Hi {{ user.name }}{% endif %}\n";
    let env = env_with(&[("page.tsl", source)]);
    let first = env.compile_source(source, "page.tsl").unwrap();
    let second = env.compile_source(source, "page.tsl").unwrap();
    assert_eq!(first, second);

    let other = env_with(&[("page.tsl", source)]);
    assert_eq!(other.compile_source(source, "page.tsl").unwrap(), first);
}

#[test]
fn test_unit_layout() {
    let env = env_with(&[("index.tsl", "Hello {{ name }}")]);
    let unit = env.resolve_unit("index.tsl", None).unwrap();
    let source = unit.source();

    assert!(source.starts_with("// source \"index.tsl\"\n"));
    assert!(source.contains(&format!("unit {} extends Unit {{", unit.name())));
    assert!(source.contains("return \"index.tsl\";"));
    assert!(source.contains("echo \"Hello \";"));
    assert!(source.contains("echo escape(env, (context[\"name\"] ?? null), \"html\");"));
}

#[test]
fn test_unit_names_depend_only_on_cache_key() {
    let a = env_with(&[("index.tsl", "Hello")]);
    let b = env_with(&[("index.tsl", "Hello")]);
    let changed = env_with(&[("index.tsl", "Goodbye")]);

    let name = a.unit_name("index.tsl", None).unwrap();
    assert_eq!(name, b.unit_name("index.tsl", None).unwrap());
    assert_ne!(name, changed.unit_name("index.tsl", None).unwrap());
    assert!(name.to_string().starts_with(a.unit_name_prefix()));
    assert!(a.unit_name("index.tsl", Some(1)).unwrap().to_string().ends_with("_1"));
}

#[test]
fn test_float_literals_keep_decimal_point() {
    let source = "{{ 1.5 }}|{{ 2.0 }}|{{ 10 }}";
    let env = env_with(&[("n.tsl", source)]);
    let compiled = env.compile_source(source, "n.tsl").unwrap();
    assert!(compiled.contains("echo 1.5;"));
    assert!(compiled.contains("echo 2.0;"));
    assert!(compiled.contains("echo 10;"));
}

#[test]
fn test_debug_map_points_after_line_markers() {
    let source = "one\n{{ a }}\nthree\n\n{{ b }}\n";
    let env = env_with(&[("lines.tsl", source)]);
    let compiled = env.compile_source(source, "lines.tsl").unwrap();
    let map = debug_map(&compiled);
    assert!(!map.is_empty());

    let lines: Vec<&str> = compiled.lines().collect();
    let mut previous = 0;
    for (output, template_line) in &map {
        assert_eq!(lines[output - 2].trim(), format!("// line {}", template_line));
        assert!(lines[output - 1].trim().starts_with("echo "));
        assert!(*template_line >= previous);
        previous = *template_line;
    }
}

#[test]
fn test_strict_variables() {
    let options = EnvironmentOptions {
        strict_variables: true,
        autoescape: Autoescape::Disabled,
        ..Default::default()
    };
    let loader: ArrayLoader = [("s.tsl", "{{ missing }}")].into_iter().collect();
    let env = Environment::with_options(loader, options);
    let compiled = env.compile_source("{{ missing }}", "s.tsl").unwrap();
    assert!(compiled.contains("echo variable(context, \"missing\", 1);"));
}

#[test]
fn test_autoescape_by_filename() {
    let options = EnvironmentOptions {
        autoescape: Autoescape::Filename,
        ..Default::default()
    };
    let loader: ArrayLoader = [
        ("app.js.tsl", "{{ data }}"),
        ("notes.txt.tsl", "{{ data }}"),
    ]
    .into_iter()
    .collect();
    let env = Environment::with_options(loader, options);

    let js = env.resolve_unit("app.js.tsl", None).unwrap();
    assert!(js.source().contains("escape(env, (context[\"data\"] ?? null), \"js\")"));
    let txt = env.resolve_unit("notes.txt.tsl", None).unwrap();
    assert!(txt.source().contains("echo (context[\"data\"] ?? null);"));
}

#[test]
fn test_raw_filter_skips_escaping_and_is_optimized_away() {
    let env = env_with(&[("r.tsl", "{{ body|raw }}")]);
    let compiled = env.compile_source("{{ body|raw }}", "r.tsl").unwrap();
    assert!(compiled.contains("echo (context[\"body\"] ?? null);"));

    let options = EnvironmentOptions {
        optimizations: 0,
        ..Default::default()
    };
    let loader: ArrayLoader = [("r.tsl", "{{ body|raw }}")].into_iter().collect();
    let unoptimized = Environment::with_options(loader, options);
    let compiled = unoptimized.compile_source("{{ body|raw }}", "r.tsl").unwrap();
    assert!(compiled.contains("echo raw((context[\"body\"] ?? null));"));
}

#[test]
fn test_wildcard_filters_resolve_in_registration_order() {
    let mut env = env_with(&[("w.tsl", "{{ x|x_y }}")]);
    env.add_filter(Filter::new("x_*", "first").safe(&["html"])).unwrap();
    env.add_filter(Filter::new("*_y", "second").safe(&["html"])).unwrap();

    let compiled = env.compile_source("{{ x|x_y }}", "w.tsl").unwrap();
    assert!(compiled.contains("echo first(\"y\", (context[\"x\"] ?? null));"));
}

#[test]
fn test_undefined_filter_callback() {
    let mut env = env_with(&[("c.tsl", "{{ x|dyn_thing }}")]);
    env.register_undefined_filter_callback(|name| {
        name.strip_prefix("dyn_")
            .map(|rest| Filter::new(name, format!("dynamic_{}", rest)).safe(&["all"]))
    })
    .unwrap();

    let compiled = env.compile_source("{{ x|dyn_thing }}", "c.tsl").unwrap();
    assert!(compiled.contains("dynamic_thing((context[\"x\"] ?? null))"));
    let err = env.compile_source("{{ x|other }}", "c.tsl").unwrap_err();
    assert!(matches!(err, Error::Syntax(_)));
}

#[test]
fn test_syntax_errors_carry_template_and_line() {
    let source = "line one\n{{ name|uper }}";
    let env = env_with(&[("bad.tsl", source)]);
    let err = env.resolve_unit("bad.tsl", None).unwrap_err();
    let payload = err.template_error().unwrap();
    assert!(matches!(err, Error::Syntax(_)));
    assert_eq!(payload.template_name(), Some("bad.tsl"));
    assert_eq!(payload.line(), Some(2));
    assert!(err.to_string().contains("Unknown \"uper\" filter"));
}

struct FailingLexer;

impl Lexer for FailingLexer {
    fn tokenize(&self, _env: &Environment, _source: &str, _name: &str) -> tessel::Result<TokenStream> {
        Err(Error::Other("lexer exploded".into()))
    }
}

#[test]
fn test_foreign_failures_become_syntax_errors() {
    let mut env = env_with(&[("a.tsl", "x")]);
    env.set_lexer(FailingLexer);
    let err = env.compile_source("x", "a.tsl").unwrap_err();
    let payload = err.template_error().unwrap();
    assert!(matches!(err, Error::Syntax(_)));
    assert_eq!(
        payload.message(),
        "An exception has been thrown during the compilation of a template (\"lexer exploded\")."
    );
    assert_eq!(payload.template_name(), Some("a.tsl"));
    assert_eq!(payload.line_marker(), -1);
}

#[test]
fn test_registry_freezes_on_first_compile() {
    let mut env = env_with(&[("a.tsl", "x")]);
    env.compile_source("x", "a.tsl").unwrap();
    assert!(env.is_initialized());
    let err = env.add_filter(Filter::new("late", "late")).unwrap_err();
    assert!(matches!(err, Error::Logic(_)));
}
