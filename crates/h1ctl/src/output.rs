use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use h1ctl_session::{Response, WorkflowReport};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    host: &'a str,
    #[serde(flatten)]
    response: &'a Response,
}

/// Print a device reply to stdout.
pub fn print_response(response: &Response, host: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ResponseOutput { host, response }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"])
                .add_row(vec!["command".to_string(), response.command.clone()])
                .add_row(vec!["status".to_string(), response.status.to_string()]);
            for (key, value) in &response.extra {
                table.add_row(vec![key.clone(), render_value(value)]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let mut line = format!(
                "host={host} command={} status={}",
                response.command, response.status
            );
            for (key, value) in &response.extra {
                line.push_str(&format!(" {key}={}", render_value(value)));
            }
            println!("{line}");
        }
    }
}

#[derive(Serialize)]
struct WorkflowOutput<'a> {
    host: &'a str,
    camera: u32,
    #[serde(flatten)]
    report: &'a WorkflowReport,
}

/// Print the outcome of a record workflow to stdout.
pub fn print_report(report: &WorkflowReport, host: &str, camera: u32, format: OutputFormat) {
    let seq = &report.sequence;
    match format {
        OutputFormat::Json => print_json(&WorkflowOutput {
            host,
            camera,
            report,
        }),
        OutputFormat::Table => {
            let upload = match &report.upload {
                Some(resp) => format!("status {}", resp.status),
                None => "skipped".to_string(),
            };
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "HOST",
                    "CAMERA",
                    "CLIPS",
                    "START FAILURES",
                    "STOP FAILURES",
                    "UPLOAD",
                ])
                .add_row(vec![
                    host.to_string(),
                    camera.to_string(),
                    seq.clips.to_string(),
                    seq.start_failures.to_string(),
                    seq.stop_failures.to_string(),
                    upload,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "host={host} camera={camera} clips={} start_failures={} stop_failures={} upload={}",
                seq.clips,
                seq.start_failures,
                seq.stop_failures,
                if report.upload.is_some() { "ok" } else { "skipped" }
            );
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn response_json_carries_host_and_extra_fields() {
        let response: Response =
            serde_json::from_value(json!({"command": "status", "status": 0, "gps": "fix"}))
                .unwrap();
        let out = serde_json::to_value(ResponseOutput {
            host: "10.0.0.5",
            response: &response,
        })
        .unwrap();
        assert_eq!(
            out,
            json!({"host": "10.0.0.5", "command": "status", "status": 0, "gps": "fix"})
        );
    }

    #[test]
    fn strings_render_without_quotes() {
        assert_eq!(render_value(&json!("on")), "on");
        assert_eq!(render_value(&json!([1, 2])), "[1,2]");
    }
}
