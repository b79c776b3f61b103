//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders plans, apply reports, stored state and schemas in the format
//! selected by `--output`. Table uses `tabled`, structured formats use serde,
//! plain emits one address per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::Value;
use tabled::{Table, Tabled, settings::Style};

use unifi_provider_core::{
    Action, ApplyReport, ChangeSet, FieldDiff, InstanceReport, Operation, Outcome, Schema,
    StateRecord,
};

use crate::cli::{ColorMode, OutputFormat};

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable items in the chosen format.
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => data.iter().map(&id_fn).collect::<Vec<_>>().join("\n"),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_json<T: Serialize + ?Sized>(data: &T, compact: bool) -> String {
    let rendered = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    rendered.unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {e}\"}}"))
}

fn render_yaml<T: Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).unwrap_or_else(|e| format!("error: serialization failed: {e}"))
}

// ── Plans ────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "")]
    symbol: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Changes")]
    changes: String,
}

fn symbol(action: Action, color: bool) -> String {
    let plain = match action {
        Action::Create => "+",
        Action::Update => "~",
        Action::Replace => "-/+",
        Action::Delete => "-",
        Action::NoOp => " ",
    };
    if !color {
        return plain.to_owned();
    }
    match action {
        Action::Create => plain.green().to_string(),
        Action::Update => plain.yellow().to_string(),
        Action::Replace => plain.magenta().to_string(),
        Action::Delete => plain.red().to_string(),
        Action::NoOp => plain.to_owned(),
    }
}

/// `x_` attributes hold secrets on UniFi (e.g. `x_passphrase`).
fn show(name: &str, value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "(none)".into(),
        Some(_) if name.starts_with("x_") => "(sensitive)".into(),
        Some(Value::String(s)) => format!("{s:?}"),
        Some(other) => other.to_string(),
    }
}

fn describe_diff(name: &str, diff: &FieldDiff) -> String {
    let new = if diff.known_after_apply {
        "(known after apply)".into()
    } else {
        show(name, diff.new.as_ref())
    };
    match diff.old {
        Some(_) => format!("{name}: {} -> {new}", show(name, diff.old.as_ref())),
        None => format!("{name}: {new}"),
    }
}

fn plan_row(op: &Operation, color: bool) -> PlanRow {
    PlanRow {
        symbol: symbol(op.action, color),
        address: op.address.to_string(),
        action: op.action.to_string(),
        id: op.id.clone().unwrap_or_default(),
        changes: op
            .field_diffs
            .iter()
            .map(|(name, diff)| describe_diff(name, diff))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

pub fn render_plan(format: &OutputFormat, changes: &ChangeSet, color: bool) -> String {
    if matches!(format, OutputFormat::Table) {
        let pending: Vec<Operation> = changes
            .iter()
            .filter(|op| op.action.is_change())
            .cloned()
            .collect();
        let summary = changes.summary();
        let line = format!(
            "Plan: {} to create, {} to update, {} to replace, {} to delete, {} unchanged.",
            summary.create, summary.update, summary.replace, summary.delete, summary.unchanged
        );
        if pending.is_empty() {
            return format!("No changes. {line}");
        }
        let table = render_list(format, &pending, |op| plan_row(op, color), |op| {
            op.address.to_string()
        });
        return format!("{table}\n{line}");
    }
    render_list(
        format,
        changes.operations(),
        |op| plan_row(op, color),
        |op| op.address.to_string(),
    )
}

// ── Apply reports ────────────────────────────────────────────────────

#[derive(Serialize)]
struct ReportEntry {
    address: String,
    action: Action,
    lifecycle: String,
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    partial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&InstanceReport> for ReportEntry {
    fn from(report: &InstanceReport) -> Self {
        let (partial, error) = match &report.outcome {
            Outcome::Applied { .. } => (None, None),
            Outcome::Failed { partial, error } => {
                (Some(partial.to_string()), Some(error.to_string()))
            }
        };
        Self {
            address: report.address.to_string(),
            action: report.action,
            lifecycle: report.lifecycle.to_string(),
            id: report.id().map(str::to_owned),
            partial,
            error,
        }
    }
}

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Error")]
    error: String,
}

fn report_row(entry: &ReportEntry, color: bool) -> ReportRow {
    let result = match &entry.partial {
        None => entry.lifecycle.clone(),
        Some(partial) => format!("{} ({partial})", entry.lifecycle),
    };
    let result = match (color, entry.error.is_some()) {
        (false, _) => result,
        (true, false) => result.green().to_string(),
        (true, true) => result.red().to_string(),
    };
    ReportRow {
        address: entry.address.clone(),
        action: entry.action.to_string(),
        result,
        id: entry.id.clone().unwrap_or_default(),
        error: entry.error.clone().unwrap_or_default(),
    }
}

pub fn render_report(format: &OutputFormat, report: &ApplyReport, color: bool) -> String {
    let entries: Vec<ReportEntry> = report
        .instances
        .iter()
        .filter(|r| r.action.is_change() || !r.is_applied())
        .map(ReportEntry::from)
        .collect();
    let rendered = render_list(format, &entries, |e| report_row(e, color), |e| {
        e.address.clone()
    });
    if matches!(format, OutputFormat::Table) {
        format!("{rendered}\n{report}")
    } else {
        rendered
    }
}

// ── Stored state ─────────────────────────────────────────────────────

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Certainty")]
    certainty: String,
    #[tabled(rename = "Depends On")]
    dependencies: String,
}

fn record_row(record: &StateRecord) -> RecordRow {
    RecordRow {
        address: record.address.to_string(),
        id: record.id().unwrap_or("(absent)").to_owned(),
        certainty: format!("{:?}", record.certainty).to_lowercase(),
        dependencies: record
            .dependencies
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

pub fn render_records(format: &OutputFormat, records: &[StateRecord]) -> String {
    render_list(format, records, record_row, |r| r.address.to_string())
}

// ── Schemas ──────────────────────────────────────────────────────────

#[derive(Tabled)]
struct KindRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Endpoint")]
    endpoint: String,
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Attributes")]
    attributes: usize,
}

#[derive(Tabled)]
struct AttributeRow {
    #[tabled(rename = "Attribute")]
    name: String,
    #[tabled(rename = "Type")]
    ty: String,
    #[tabled(rename = "Presence")]
    presence: String,
    #[tabled(rename = "Force New")]
    force_new: String,
    #[tabled(rename = "Default")]
    default: String,
}

pub fn render_schemas(format: &OutputFormat, schemas: &[Schema]) -> String {
    render_list(
        format,
        schemas,
        |s| KindRow {
            kind: s.kind.to_string(),
            endpoint: s.endpoint().to_owned(),
            identity: s.identity.clone(),
            attributes: s.attributes.len(),
        },
        |s| s.kind.to_string(),
    )
}

pub fn render_schema(format: &OutputFormat, schema: &Schema) -> String {
    match format {
        OutputFormat::Table => {
            let rows: Vec<AttributeRow> = schema
                .attributes
                .iter()
                .map(|a| AttributeRow {
                    name: a.name.clone(),
                    ty: a.ty.to_string(),
                    presence: a.presence.to_string(),
                    force_new: if a.force_new { "yes" } else { "" }.into(),
                    default: a.default.as_ref().map(ToString::to_string).unwrap_or_default(),
                })
                .collect();
            format!(
                "{} ({}), identified by {}\n{}",
                schema.kind,
                schema.endpoint(),
                schema.identity,
                render_table(&rows)
            )
        }
        OutputFormat::Json => render_json(schema, false),
        OutputFormat::JsonCompact => render_json(schema, true),
        OutputFormat::Yaml => render_yaml(schema),
        OutputFormat::Plain => schema
            .attributes
            .iter()
            .map(|a| a.name.clone())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn diffs_hide_secrets_and_pending_ids() {
        let changed = FieldDiff::changed(Some(json!(20)), Some(json!(30)));
        assert_eq!(describe_diff("vlan", &changed), "vlan: 20 -> 30");

        let secret = FieldDiff::changed(None, Some(json!("hunter2")));
        assert_eq!(describe_diff("x_passphrase", &secret), "x_passphrase: (sensitive)");

        let pending = FieldDiff::after_apply(Some(json!("n1")));
        assert_eq!(
            describe_diff("networkconf_id", &pending),
            "networkconf_id: \"n1\" -> (known after apply)"
        );
    }

    #[test]
    fn symbols_without_color_are_plain() {
        assert_eq!(symbol(Action::Replace, false), "-/+");
        assert_eq!(symbol(Action::Delete, false), "-");
    }
}
