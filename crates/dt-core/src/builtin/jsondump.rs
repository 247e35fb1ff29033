//! `jsondump`: writes the aggregate to `reports/report.json`.
//!
//! Options: `indent` (default 4; 0 writes compact JSON).

use crate::plugin::{ModuleContext, ReportModule};
use dt_common::{ModuleError, ModuleResult, ResultAggregate};
use serde::Serialize;
use std::fs;
use std::io::Write;

pub const NAME: &str = "jsondump";
pub const ORDER: i32 = 1;

const DEFAULT_INDENT: i64 = 4;

#[derive(Debug, Default)]
pub struct JsonDump;

fn render(results: &ResultAggregate, indent: usize) -> ModuleResult<Vec<u8>> {
    if indent == 0 {
        return Ok(serde_json::to_vec(results)?);
    }
    let pad = vec![b' '; indent];
    let formatter = serde_json::ser::PrettyFormatter::with_indent(&pad);
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    results.serialize(&mut ser)?;
    Ok(out)
}

impl ReportModule for JsonDump {
    fn run(&mut self, ctx: &ModuleContext<'_>, results: &ResultAggregate) -> ModuleResult<()> {
        let indent = ctx.options.get_int("indent").unwrap_or(DEFAULT_INDENT);
        let indent = usize::try_from(indent)
            .map_err(|_| ModuleError::report(format!("invalid indent {indent}")))?;

        let body = render(results, indent)?;

        let dir = ctx.analysis_path.join("reports");
        let path = dir.join("report.json");
        let write = || -> std::io::Result<()> {
            fs::create_dir_all(&dir)?;
            let mut file = fs::File::create(&path)?;
            file.write_all(&body)?;
            file.flush()
        };
        write().map_err(|e| ModuleError::report(format!("failed to write {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dt_common::{Task, CATEGORY_FILE};
    use dt_config::ModuleOptions;
    use tempfile::TempDir;

    fn run_with(options: &ModuleOptions, dir: &std::path::Path) -> ModuleResult<()> {
        let task = Task::new(1, "a.exe", CATEGORY_FILE);
        let ctx = ModuleContext {
            task: &task,
            analysis_path: dir,
            options,
        };
        let mut results = ResultAggregate::new(CATEGORY_FILE);
        results.malfamily = "Zeus".into();
        JsonDump.run(&ctx, &results)
    }

    #[test]
    fn test_writes_pretty_report() {
        let dir = TempDir::new().unwrap();
        run_with(&ModuleOptions::enabled(), dir.path()).unwrap();

        let text = fs::read_to_string(dir.path().join("reports/report.json")).unwrap();
        assert!(text.contains("\n    \"target\""));
        let parsed: ResultAggregate = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.malfamily, "Zeus");
    }

    #[test]
    fn test_zero_indent_is_compact() {
        let dir = TempDir::new().unwrap();
        run_with(&ModuleOptions::enabled().with_value("indent", 0i64), dir.path()).unwrap();
        let text = fs::read_to_string(dir.path().join("reports/report.json")).unwrap();
        assert!(!text.contains('\n'));
    }

    #[test]
    fn test_unwritable_path_is_report_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let err = run_with(&ModuleOptions::enabled(), &blocker).unwrap_err();
        assert!(matches!(err, ModuleError::Report(_)));
    }
}
