use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use sf_core::{Scenario, ScenarioError, ScenarioModule};
use walkdir::WalkDir;

pub const LOADER_NOT_FOUND: &str = "LOADER_NOT_FOUND";
pub const LOADER_READ: &str = "LOADER_READ";
pub const LOADER_PARSE: &str = "LOADER_PARSE";
pub const LOADER_SCAN: &str = "LOADER_SCAN";

/// Entry file names tried, in order, when loading a directory.
pub const ENTRY_FILES: [&str; 2] = ["main.json", "scenario.json"];

/// Loads a scenario from a single JSON file or a directory.
///
/// Directory form: the entry file is merged with the modules it lists under
/// `modules`, in order, or with every other `*.json` below the directory in
/// sorted relative-path order when it lists none. Later modules win.
pub fn load_scenario(path: impl AsRef<Path>) -> Result<Scenario, ScenarioError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ScenarioError::evaluation(
            LOADER_NOT_FOUND,
            format!("scenario path does not exist: {}", path.display()),
        ));
    }
    if path.is_dir() {
        return load_directory(path);
    }

    let mut scenario: Scenario = read_json(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let modules = std::mem::take(&mut scenario.modules);
    for module in &modules {
        merge_listed(&mut scenario, base, module)?;
    }
    scenario.modules = modules;
    Ok(scenario)
}

/// Loads a scenario from an in-memory JSON document.
pub fn parse_scenario(source: &str) -> Result<Scenario, ScenarioError> {
    serde_json::from_str(source).map_err(|error| {
        ScenarioError::evaluation(LOADER_PARSE, format!("invalid scenario JSON: {}", error))
    })
}

fn load_directory(root: &Path) -> Result<Scenario, ScenarioError> {
    let entry = ENTRY_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            ScenarioError::evaluation(
                LOADER_NOT_FOUND,
                format!(
                    "no {} under {}",
                    ENTRY_FILES.join(" or "),
                    root.display()
                ),
            )
        })?;

    let mut scenario: Scenario = read_json(&entry)?;
    if !scenario.modules.is_empty() {
        let modules = std::mem::take(&mut scenario.modules);
        for module in &modules {
            merge_listed(&mut scenario, root, module)?;
        }
        scenario.modules = modules;
        return Ok(scenario);
    }

    for module in scan_modules(root, &entry)? {
        let parsed: ScenarioModule = read_json(&module)?;
        tracing::debug!(module = %module.display(), "merging scenario module");
        scenario.merge_module(parsed);
    }
    Ok(scenario)
}

fn merge_listed(scenario: &mut Scenario, base: &Path, module: &str) -> Result<(), ScenarioError> {
    let mut path = base.join(module);
    if path.extension().is_none() {
        path.set_extension("json");
    }
    if !path.is_file() {
        return Err(ScenarioError::evaluation(
            LOADER_NOT_FOUND,
            format!("listed module \"{}\" not found at {}", module, path.display()),
        ));
    }
    let parsed: ScenarioModule = read_json(&path)?;
    tracing::debug!(module, "merging scenario module");
    scenario.merge_module(parsed);
    Ok(())
}

fn scan_modules(root: &Path, entry: &Path) -> Result<Vec<PathBuf>, ScenarioError> {
    let mut modules = Vec::new();
    for item in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let item = item.map_err(|error| {
            ScenarioError::evaluation(LOADER_SCAN, format!("cannot scan {}: {}", root.display(), error))
        })?;
        let path = item.path();
        if !item.file_type().is_file() || path == entry {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        modules.push(path.to_path_buf());
    }
    modules.sort_by_key(|path| {
        path.strip_prefix(root)
            .map(|relative| relative.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default()
    });
    Ok(modules)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ScenarioError> {
    let content = fs::read_to_string(path).map_err(|error| {
        ScenarioError::evaluation(LOADER_READ, format!("cannot read {}: {}", path.display(), error))
    })?;
    serde_json::from_str(&content).map_err(|error| {
        ScenarioError::evaluation(LOADER_PARSE, format!("invalid JSON in {}: {}", path.display(), error))
    })
}

#[cfg(test)]
mod loader_tests {
    use super::*;
    use serde_json::json;

    fn write(root: &Path, relative: &str, value: serde_json::Value) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent dir");
        }
        fs::write(path, value.to_string()).expect("write fixture");
    }

    #[test]
    fn loads_a_single_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "bot.json",
            json!({
                "startActions": {"action": "EmitOutput", "text": "hi"},
                "menuItems": {"Main": {"onNavigation": []}}
            }),
        );
        let scenario = load_scenario(dir.path().join("bot.json")).expect("load");
        assert!(scenario.menu_items.contains_key("Main"));
        assert_eq!(scenario.start_actions["text"], json!("hi"));
    }

    #[test]
    fn directory_merges_other_files_in_sorted_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "main.json",
            json!({"menuItems": {"Main": {"onNavigation": {"action": "EmitOutput", "text": "entry"}}}}),
        );
        write(
            dir.path(),
            "a/shop.json",
            json!({"menuItems": {"Shop": {"onNavigation": []}, "Main": {"onNavigation": {"action": "EmitOutput", "text": "a"}}}}),
        );
        write(
            dir.path(),
            "b.json",
            json!({
                "menuItems": {"Main": {"onNavigation": {"action": "EmitOutput", "text": "b"}}},
                "functions": {"Greet": {"params": {"name": "x"}, "result": "hi {{name}}"}}
            }),
        );
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let scenario = load_scenario(dir.path()).expect("load");
        assert!(scenario.menu_items.contains_key("Shop"));
        assert!(scenario.functions.contains_key("Greet"));
        assert_eq!(
            scenario.menu_graph("Main").map(|graph| graph["text"].clone()),
            Some(json!("b"))
        );
    }

    #[test]
    fn listed_modules_load_in_listed_order_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "scenario.json",
            json!({"modules": ["later", "first.json"]}),
        );
        write(dir.path(), "first.json", json!({"data": {"who": "first"}}));
        write(dir.path(), "later.json", json!({"data": {"who": "later"}}));
        write(dir.path(), "unlisted.json", json!({"data": {"extra": true}}));

        let scenario = load_scenario(dir.path()).expect("load");
        assert_eq!(scenario.data.get("who"), Some(&json!("first")));
        assert!(!scenario.data.contains_key("extra"));
        assert_eq!(scenario.modules, vec!["later".to_string(), "first.json".to_string()]);
    }

    #[test]
    fn errors_carry_loader_codes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = load_scenario(dir.path().join("nope.json")).expect_err("missing");
        assert_eq!(missing.code, LOADER_NOT_FOUND);

        let no_entry = load_scenario(dir.path()).expect_err("no entry");
        assert_eq!(no_entry.code, LOADER_NOT_FOUND);

        fs::write(dir.path().join("main.json"), "{ not json").expect("write");
        let invalid = load_scenario(dir.path()).expect_err("bad json");
        assert_eq!(invalid.code, LOADER_PARSE);

        write(dir.path(), "main.json", json!({"modules": ["ghost"]}));
        let ghost = load_scenario(dir.path()).expect_err("missing module");
        assert_eq!(ghost.code, LOADER_NOT_FOUND);
    }

    #[test]
    fn parse_scenario_reports_parse_errors() {
        assert!(parse_scenario(r#"{"startActions": []}"#).is_ok());
        let error = parse_scenario(r#"{"menuItems": 3}"#).expect_err("wrong shape");
        assert_eq!(error.code, LOADER_PARSE);
    }
}
