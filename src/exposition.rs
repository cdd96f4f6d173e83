//! Prometheus text exposition (format 0.0.4)

use std::fmt::Write;

use crate::collector::{Collector, Sample};

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub const BUILD_INFO_NAME: &str = "icmp_exporter_build_info";

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

/// Render all seven gauge families. Families without samples still carry
/// their `HELP` and `TYPE` lines.
pub fn render(samples: &[Sample]) -> String {
    let mut out = String::new();

    for descriptor in Collector::describe() {
        // writing to a String cannot fail
        let _ = writeln!(out, "# HELP {} {}", descriptor.name, descriptor.help);
        let _ = writeln!(out, "# TYPE {} gauge", descriptor.name);

        for sample in samples.iter().filter(|s| s.kind == descriptor.kind) {
            let _ = writeln!(
                out,
                "{}{{host=\"{}\",interface=\"{}\"}} {}",
                descriptor.name,
                escape_label_value(&sample.host),
                escape_label_value(&sample.interface),
                format_value(sample.value),
            );
        }
    }

    out
}

/// Constant gauge identifying the running exporter version
pub fn render_build_info() -> String {
    format!(
        "# HELP {BUILD_INFO_NAME} A metric with a constant '1' value labeled by version of icmp_exporter.\n\
         # TYPE {BUILD_INFO_NAME} gauge\n\
         {BUILD_INFO_NAME}{{version=\"{}\"}} 1\n",
        env!("CARGO_PKG_VERSION")
    )
}
