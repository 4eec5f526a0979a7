use edgeflow::flow::{FlowFile, FILENAME, PATH};
use edgeflow::listing::ListingReport;
use edgeflow::state::StateMap;
use edgeflow::tail::TailReport;
use std::collections::BTreeMap;
use std::fmt::Write;

/// One line per listed file, `path` + `filename`.
pub fn listing(flow_files: &[FlowFile], report: &ListingReport) -> String {
    if flow_files.is_empty() {
        return format!(
            "No new files ({} already listed, {} filtered)\n",
            report.already_listed, report.filtered
        );
    }
    let mut out = String::new();
    for ff in flow_files {
        let _ = writeln!(
            out,
            "{}{}",
            ff.attribute(PATH).unwrap_or_default(),
            ff.attribute(FILENAME).unwrap_or_default()
        );
    }
    out
}

/// One line per emitted fragment with its size.
pub fn fragments(flow_files: &[FlowFile], report: &TailReport) -> String {
    let mut out = String::new();
    for ff in flow_files {
        let _ = writeln!(
            out,
            "{}\t{} bytes",
            ff.attribute(FILENAME).unwrap_or_default(),
            ff.size()
        );
    }
    if flow_files.is_empty() {
        out.push_str("No new data\n");
    }
    if report.skipped > 0 {
        let _ = writeln!(out, "{} file(s) could not be read", report.skipped);
    }
    out
}

/// Stored state as pretty JSON with sorted keys.
pub fn state(map: &StateMap) -> serde_json::Result<String> {
    let sorted: BTreeMap<&String, &String> = map.iter().collect();
    serde_json::to_string_pretty(&sorted)
}
