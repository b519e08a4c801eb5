use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Print a result: the whole envelope as JSON, or the message followed by
/// `text` in text mode.
pub fn output_success(output_format: OutputFormat, message: &str, data: Value, text: &str) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let response = json!({
                "success": true,
                "message": message,
                "data": data,
            });
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
            if !text.is_empty() {
                println!("{}", text);
            }
        }
    }
    Ok(())
}
