use crate::model::ScanResult;
use anyhow::Result;

/// Pretty-printed JSON with a trailing newline.
pub fn to_json(result: &ScanResult) -> Result<String> {
    let mut json = serde_json::to_string_pretty(result)?;
    json.push('\n');
    Ok(json)
}

pub fn print_json(result: &ScanResult) -> Result<()> {
    print!("{}", to_json(result)?);
    Ok(())
}
