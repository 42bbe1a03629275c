use ciwarden::core::error::WardenError;
use ciwarden::plugins::compliance::{ComplianceMode, ComplianceResult, check, is_satisfied};
use ciwarden::plugins::ingest::load_manifest;

#[test]
fn test_all_mode_reports_missing_in_required_order() {
    let result = check(
        &["dotnet build", "dotnet test"],
        &["dotnet build -c Release"],
        ComplianceMode::All,
    );
    assert_eq!(
        result,
        ComplianceResult {
            compliant: false,
            missing: vec!["dotnet test".to_string()],
        }
    );

    let result = check(
        &["lint", "dotnet test", "dotnet build"],
        &["DOTNET BUILD"],
        ComplianceMode::All,
    );
    assert!(!result.compliant);
    assert_eq!(result.missing, vec!["lint", "dotnet test"]);
}

#[test]
fn test_dotnet_and_npm_required_commands() {
    let required = ["dotnet build", "npm test"];

    let result = check(
        &required,
        &["dotnet build -c Release", "npm ci", "npm test --watch"],
        ComplianceMode::All,
    );
    assert_eq!(
        result,
        ComplianceResult {
            compliant: true,
            missing: vec![],
        }
    );

    let result = check(&required, &["npm ci"], ComplianceMode::Any);
    assert_eq!(
        result,
        ComplianceResult {
            compliant: false,
            missing: vec!["dotnet build".to_string(), "npm test".to_string()],
        }
    );
}

#[test]
fn test_any_mode_needs_one_satisfied() {
    let result = check(&["a", "b"], &["b --flag"], ComplianceMode::Any);
    assert!(result.compliant);
    assert!(result.missing.is_empty());

    let result = check(&["a", "b"], &["c"], ComplianceMode::Any);
    assert!(!result.compliant);
    assert_eq!(result.missing, vec!["a", "b"]);
}

#[test]
fn test_empty_required_list() {
    let none: [&str; 0] = [];
    assert!(check(&none, &["anything"], ComplianceMode::All).compliant);
    assert!(!check(&none, &["anything"], ComplianceMode::Any).compliant);
}

#[test]
fn test_required_commands_compare_canonically() {
    let executed = vec!["cargo test --workspace".to_string()];
    assert!(is_satisfied("  Cargo Test ", &executed));
    assert!(!is_satisfied("cargo build", &executed));
    assert!(!is_satisfied("# cargo test", &executed));
}

#[test]
fn test_prefix_match_is_literal() {
    // "cargo testing" starts with "cargo test".
    let result = check(&["cargo test"], &["cargo testing"], ComplianceMode::All);
    assert!(result.compliant);
}

#[test]
fn test_manifest_feeds_check() {
    let executed = load_manifest("{\"cmd\": \"npm ci\"}\n{\"cmd\": \"npm run build\"}\n").unwrap();
    let result = check(&["npm ci", "npm test"], &executed, ComplianceMode::All);
    assert_eq!(result.missing, vec!["npm test"]);
}

#[test]
fn test_mode_parsing() {
    assert_eq!("all".parse::<ComplianceMode>().unwrap(), ComplianceMode::All);
    assert_eq!("any".parse::<ComplianceMode>().unwrap(), ComplianceMode::Any);
    assert_eq!(ComplianceMode::default(), ComplianceMode::All);
    assert!(matches!(
        "most".parse::<ComplianceMode>(),
        Err(WardenError::ConfigurationError(_))
    ));
}
