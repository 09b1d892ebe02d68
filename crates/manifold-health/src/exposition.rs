//! Prometheus text exposition of component readiness.

use std::collections::BTreeMap;

use crate::health::{Health, Report};

/// Render the `background_job_ready` gauge: 1 for `Ready`, 0 otherwise.
pub fn render_readiness(reports: &BTreeMap<String, Report>) -> String {
    let mut out = String::new();

    // Empty help text, kept byte-compatible with existing scrapers.
    out.push_str("# HELP background_job_ready \n");
    out.push_str("# TYPE background_job_ready gauge\n");
    for (name, report) in reports {
        let value = u8::from(report.health == Health::Ready);
        out.push_str(&format!(
            "background_job_ready{{name=\"{}\"}} {}\n",
            escape_label(name),
            value
        ));
    }

    out
}

/// Escape a label value per the exposition format.
fn escape_label(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}
