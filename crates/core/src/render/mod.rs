//! Minimal self-contained HTML pages.
//!
//! Pages carry their chart data as embedded JSON and draw it client-side with Plotly from a CDN.
//! Nothing here touches the filesystem; generators decide where the markup goes.

pub mod pages;

use serde::Serialize;

pub use pages::{
    breakdown_page, equity_page, profile_page, theme_page, ChartLine, ComparisonChart, EquityView,
    MemberRow, ProfileView, RankLink, ThemeView,
};

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";
pub const NOT_AVAILABLE: &str = "N/A";

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Percent with sign, or "N/A".
pub fn fmt_pct(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:+.2}%"),
        _ => NOT_AVAILABLE.to_string(),
    }
}

pub fn fmt_price(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.2}"),
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// Percent-encodes a path segment for links between pages.
pub fn url_segment(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for b in text.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b' ' => out.push('_'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// JSON for a `<script type="application/json">` block. `</` is escaped so the payload cannot
/// close the script element.
pub fn embed_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    let json = serde_json::to_string(value)?;
    Ok(json.replace("</", "<\\/"))
}

pub(crate) fn document(title: &str, body: &str, with_charts: bool) -> String {
    let script = if with_charts {
        format!(r#"<script src="{PLOTLY_CDN}"></script>"#)
    } else {
        String::new()
    };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
{script}
<style>
body {{ font-family: system-ui, sans-serif; margin: 2rem auto; max-width: 1100px; color: #222; }}
table {{ border-collapse: collapse; width: 100%; }}
th, td {{ padding: 0.35rem 0.6rem; border-bottom: 1px solid #ddd; text-align: left; }}
.pos {{ color: #0a7d32; }} .neg {{ color: #b3261e; }}
.placeholder {{ padding: 3rem; text-align: center; color: #777; border: 1px dashed #bbb; }}
.evidence {{ margin-bottom: 1rem; }}
</style>
</head>
<body>
{body}
</body>
</html>
"#,
        title = escape(title),
    )
}

pub(crate) fn pct_cell(value: Option<f64>) -> String {
    let class = match value {
        Some(v) if v > 0.0 => "pos",
        Some(v) if v < 0.0 => "neg",
        _ => "",
    };
    format!(r#"<td class="{class}">{}</td>"#, fmt_pct(value))
}
