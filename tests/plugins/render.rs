use ciwarden::core::config::ComponentRule;
use ciwarden::core::model::{GuidanceRule, GuidanceStatus};
use ciwarden::pipeline::resolve_changed_components;
use ciwarden::plugins::ingest::ComponentAttribution;
use ciwarden::plugins::render::{GuidanceRenderer, changed_components_from_paths};

fn rule(component: &str, description: &str, support_prs: u32, lift: f64) -> GuidanceRule {
    GuidanceRule {
        component: component.to_string(),
        description: description.to_string(),
        support_prs,
        lift,
        status: GuidanceStatus::Active,
        first_seen: "1Z".to_string(),
        last_seen: "2Z".to_string(),
    }
}

fn attribution() -> ComponentAttribution {
    ComponentAttribution::from_rules(&[
        ComponentRule {
            name: "api".to_string(),
            pattern: "^src/api/".to_string(),
            command: None,
        },
        ComponentRule {
            name: "cli".to_string(),
            pattern: "^src/(cli|bin)/".to_string(),
            command: None,
        },
    ])
    .expect("rules")
}

#[test]
fn test_warnings_follow_guidance_order_and_skip_untouched_components() {
    let guidance = vec![
        rule("api", "Run the api test suites before merging changes to api", 3, 2.0),
        rule("cli", "Run `make cli-test` before merging changes to cli", 2, 4.0),
        rule("db", "Run the db test suites before merging changes to db", 5, 1.7),
    ];
    let renderer = GuidanceRenderer::new("ciwarden");

    let warnings = renderer.build_warnings(&["cli", "docs", "api"], &guidance);
    assert_eq!(
        warnings,
        vec![
            "[ciwarden] api: Run the api test suites before merging changes to api".to_string(),
            "[ciwarden] cli: Run `make cli-test` before merging changes to cli".to_string(),
        ]
    );

    let none: [&str; 0] = [];
    assert!(renderer.build_warnings(&none, &guidance).is_empty());
    assert!(renderer.build_warnings(&["cli"], &[]).is_empty());
}

#[test]
fn test_cli_docs_api_change_warns_for_cli_and_api_only() {
    let guidance = vec![
        rule("cli", "Run `make cli-test` before merging changes to cli", 2, 3.0),
        rule("api", "Run `make api-test` before merging changes to api", 4, 2.5),
    ];
    let warnings =
        GuidanceRenderer::new("ciwarden").build_warnings(&["cli", "docs", "api"], &guidance);

    assert_eq!(warnings.len(), 2);
    assert!(warnings[0].starts_with("[ciwarden] cli:"));
    assert!(warnings[0].contains("make cli-test"));
    assert!(warnings[1].starts_with("[ciwarden] api:"));
    assert!(warnings[1].contains("make api-test"));
    assert!(warnings.iter().all(|w| !w.contains("docs")));
}

#[test]
fn test_section_lists_each_rule_with_two_decimal_lift() {
    let guidance = vec![
        rule("api", "Run the api test suites before merging changes to api", 3, 2.0),
        rule("cli", "Run `make cli-test` before merging changes to cli", 2, 4.0 / 3.0),
    ];
    let section = GuidanceRenderer::new("ciwarden").render_section("CI guidance", &guidance);
    assert_eq!(
        section,
        "## CI guidance\n\n\
         - **api**: Run the api test suites before merging changes to api (support: 3 PRs, lift: 2.00)\n\
         - **cli**: Run `make cli-test` before merging changes to cli (support: 2 PRs, lift: 1.33)\n"
    );
}

#[test]
fn test_empty_section_says_so() {
    let section = GuidanceRenderer::new("ciwarden").render_section("Known hotspots", &[]);
    assert_eq!(section, "## Known hotspots\n\n_No active guidance._\n");
}

#[test]
fn test_changed_paths_map_to_components_once() {
    let paths = [
        "src/cli/args.rs",
        "README.md",
        "src/api/routes.rs",
        "src/bin/main.rs",
    ];
    assert_eq!(
        changed_components_from_paths(&paths, &attribution()),
        vec!["cli", "api"]
    );
}

#[test]
fn test_explicit_and_path_derived_components_merge() {
    let explicit = vec!["docs".to_string(), " api ".to_string()];
    let files = vec!["src/api/x.rs".to_string(), "src/cli/y.rs".to_string()];
    assert_eq!(
        resolve_changed_components(&explicit, &files, &attribution()),
        vec!["docs", "api", "cli"]
    );
}
