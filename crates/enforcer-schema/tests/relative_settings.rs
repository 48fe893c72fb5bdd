//! Integration test: default, working-directory-relative settings.
//!
//! `Settings::default()` searches `./` for instances and keeps schemas under
//! `schema/`. The schema root must stay out of instance discovery even though
//! the walk reaches it as `./schema`. Kept in its own test binary because it
//! changes the process working directory.

use std::path::{Path, PathBuf};

use enforcer_core::Settings;
use enforcer_schema::{CancellationToken, Outcome, SchemaManager};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[test]
fn test_default_settings_skip_the_schema_root() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "schema/schemas/ntp.yml",
        "type: object\nproperties:\n  ntp_servers:\n    type: array\n    items: {type: string}\n",
    );
    write(dir.path(), "schema/tests/schemas/ntp/pass/good.yml", "ntp_servers: [a]\n");
    write(dir.path(), "schema/tests/schemas/ntp/fail/bad.yml", "ntp_servers: 1\n");
    write(dir.path(), "hostvars/ntp.yml", "ntp_servers: [ntp1]\n");

    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let manager = SchemaManager::load(&Settings::default()).unwrap();
    let (discovered, errors) = manager.discover_instances();
    let report = manager.validate_discovered(&CancellationToken::new());
    let fixtures = manager.test_schemas(&CancellationToken::new());

    std::env::set_current_dir(previous).unwrap();

    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(discovered, vec![PathBuf::from("./hostvars/ntp.yml")]);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].outcome, Outcome::Pass);
    assert!(report.unmatched.is_empty());
    assert_eq!(fixtures.results.len(), 2);
    assert!(manager.summarize(Some(&report), Some(&fixtures)));
}
