use std::fmt::Display;

use sf_core::ScenarioError;

pub(crate) const CLI_ERROR: &str = "CLI_ERROR";

fn map_error(code: &'static str, error: impl Display) -> ScenarioError {
    ScenarioError::evaluation(code, error.to_string())
}

/// Engine errors keep their own code; any other failure becomes `CLI_ERROR`.
pub(crate) fn to_scenario_error(error: anyhow::Error) -> ScenarioError {
    match error.downcast::<ScenarioError>() {
        Ok(error) => error,
        Err(other) => map_error(CLI_ERROR, format!("{:#}", other)),
    }
}

pub(crate) fn emit_error(error: anyhow::Error) -> i32 {
    let error = to_scenario_error(error);
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!(
        "ERROR_MSG_JSON:{}",
        serde_json::Value::String(error.message)
    );
    1
}

pub(crate) fn map_console_io(error: std::io::Error) -> ScenarioError {
    map_error("CLI_CONSOLE_IO", error)
}

pub(crate) fn map_runtime_start(error: std::io::Error) -> ScenarioError {
    map_error("CLI_RUNTIME", error)
}
