use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::{document, embed_json, escape, fmt_pct, fmt_price, pct_cell, url_segment};
use crate::domain::market::{Company, Evidence};
use crate::metrics::{Breakdown, PerformanceRecord, NORMALIZE_TO_ROI_JS};

/// Cumulative-percent lines sharing one date axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonChart {
    pub dates: Vec<NaiveDate>,
    pub lines: Vec<ChartLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartLine {
    pub label: String,
    pub values: Vec<Option<f64>>,
}

impl ComparisonChart {
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self {
            dates,
            lines: Vec::new(),
        }
    }

    pub fn with_line(mut self, label: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        self.lines.push(ChartLine {
            label: label.into(),
            values,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankLink {
    pub theme: String,
    pub rank: i32,
    /// Route of the theme page when the theme name resolved.
    pub href: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProfileView {
    pub symbol: String,
    pub company: Option<Company>,
    pub performance: Option<PerformanceRecord>,
    pub chart: Option<ComparisonChart>,
    pub ranks: Vec<RankLink>,
    pub evidence: Vec<Evidence>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MemberRow {
    pub symbol: String,
    pub name: Option<String>,
    pub rank: i32,
    pub performance: Option<PerformanceRecord>,
}

#[derive(Debug, Clone)]
pub struct ThemeView {
    pub name: String,
    pub industry: String,
    pub members: Vec<MemberRow>,
    pub evidence: Vec<Evidence>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EquityView {
    pub name: String,
    pub chart: Option<ComparisonChart>,
    pub members_with_data: usize,
    pub members_total: usize,
    pub generated_at: DateTime<Utc>,
}

pub fn profile_page(view: &ProfileView) -> anyhow::Result<String> {
    let company = view.company.as_ref();
    let title = match company.map(|c| c.name.trim()).filter(|n| !n.is_empty()) {
        Some(name) => format!("{name} ({})", view.symbol),
        None => view.symbol.clone(),
    };

    let mut body = format!("<h1>{}</h1>\n", escape(&title));
    if let Some(company) = company {
        if let Some(industry) = &company.industry {
            body.push_str(&format!("<p><strong>Industry:</strong> {}</p>\n", escape(industry)));
        }
        if let Some(website) = &company.website {
            body.push_str(&format!(
                "<p><a href=\"{0}\" rel=\"noopener\">{0}</a></p>\n",
                escape(website)
            ));
        }
        if let Some(description) = &company.description {
            body.push_str(&format!("<p>{}</p>\n", escape(description)));
        }
    } else {
        body.push_str("<p>No company record.</p>\n");
    }

    body.push_str("<h2>Performance</h2>\n");
    body.push_str(&performance_table(view.performance.as_ref()));

    body.push_str("<h2>Price vs benchmark</h2>\n");
    match &view.chart {
        Some(chart) => body.push_str(&chart_block("profile-chart", chart)?),
        None => body.push_str("<div class=\"placeholder\">No price data available.</div>\n"),
    }

    if !view.ranks.is_empty() {
        body.push_str("<h2>Themes</h2>\n<table><tr><th>Theme</th><th>Rank</th></tr>\n");
        for rank in &view.ranks {
            let theme = match &rank.href {
                Some(href) => format!("<a href=\"{}\">{}</a>", escape(href), escape(&rank.theme)),
                None => escape(&rank.theme),
            };
            body.push_str(&format!("<tr><td>{theme}</td><td>{}</td></tr>\n", rank.rank));
        }
        body.push_str("</table>\n");
    }

    body.push_str(&evidence_section(&view.evidence));
    body.push_str(&footer(view.generated_at));
    Ok(document(&title, &body, view.chart.is_some()))
}

pub fn theme_page(view: &ThemeView) -> anyhow::Result<String> {
    let segment = url_segment(&view.name);
    let mut body = format!(
        "<h1>{}</h1>\n<p><strong>Industry:</strong> {}</p>\n",
        escape(&view.name),
        escape(&view.industry)
    );
    body.push_str(&format!(
        "<p><a href=\"/theme/{segment}/equity\">Equity curve</a> · <a href=\"/theme/{segment}/breakdown\">Contribution breakdown</a></p>\n"
    ));

    if view.members.is_empty() {
        body.push_str("<div class=\"placeholder\">No members listed for this theme.</div>\n");
    } else {
        body.push_str(
            "<table><tr><th>Rank</th><th>Symbol</th><th>Name</th><th>Last</th><th>1D</th><th>1M</th><th>YTD</th><th>1Y</th><th>Vol 1Y</th></tr>\n",
        );
        for m in &view.members {
            let p = m.performance.as_ref();
            body.push_str(&format!(
                "<tr><td>{}</td><td><a href=\"/profile/{}\">{}</a></td><td>{}</td><td>{}</td>{}{}{}{}<td>{}</td></tr>\n",
                m.rank,
                url_segment(&m.symbol),
                escape(&m.symbol),
                escape(m.name.as_deref().unwrap_or("")),
                fmt_price(p.map(|p| p.last_close)),
                pct_cell(p.map(|p| p.day_change_pct)),
                pct_cell(p.and_then(|p| p.month_pct)),
                pct_cell(p.and_then(|p| p.ytd_pct)),
                pct_cell(p.and_then(|p| p.year_pct)),
                fmt_vol(p.and_then(|p| p.volatility_1y)),
            ));
        }
        body.push_str("</table>\n");
    }

    body.push_str(&evidence_section(&view.evidence));
    body.push_str(&footer(view.generated_at));
    Ok(document(&view.name, &body, false))
}

pub fn equity_page(view: &EquityView) -> anyhow::Result<String> {
    let title = format!("{} equity curve", view.name);
    let mut body = format!(
        "<h1>{}</h1>\n<p>Equal-weight basket of {} of {} members with price data.</p>\n",
        escape(&title),
        view.members_with_data,
        view.members_total
    );
    match &view.chart {
        Some(chart) => body.push_str(&chart_block("equity-chart", chart)?),
        None => body.push_str("<div class=\"placeholder\">No price data available.</div>\n"),
    }
    body.push_str(&footer(view.generated_at));
    Ok(document(&title, &body, view.chart.is_some()))
}

pub fn breakdown_page(
    name: &str,
    breakdown: &Breakdown,
    generated_at: DateTime<Utc>,
) -> anyhow::Result<String> {
    let title = format!("{name} contribution breakdown");
    let mut body = format!("<h1>{}</h1>\n", escape(&title));

    if breakdown.is_empty() {
        body.push_str("<div class=\"placeholder\">No price data available.</div>\n");
        body.push_str(&footer(generated_at));
        return Ok(document(&title, &body, false));
    }

    let mut chart = ComparisonChart::new(breakdown.dates.clone());
    for line in &breakdown.top {
        chart = chart.with_line(line.label.clone(), line.values.clone());
    }
    if let Some(others) = &breakdown.others {
        chart = chart.with_line(others.label.clone(), others.values.clone());
    }
    if let Some(bench) = &breakdown.benchmark {
        chart = chart.with_line(bench.label.clone(), bench.values.clone());
    }
    body.push_str(&chart_block("breakdown-chart", &chart)?);

    body.push_str("<table><tr><th>#</th><th>Symbol</th><th>Start</th><th>End</th><th>ROI</th></tr>\n");
    for (i, c) in breakdown.ranked.iter().enumerate() {
        body.push_str(&format!(
            "<tr><td>{}</td><td><a href=\"/profile/{}\">{}</a></td><td>{}</td><td>{}</td>{}</tr>\n",
            i + 1,
            url_segment(&c.symbol),
            escape(&c.symbol),
            fmt_price(c.start_price),
            fmt_price(c.end_price),
            pct_cell(c.roi_pct),
        ));
    }
    body.push_str("</table>\n");
    if breakdown.others_count > 0 {
        body.push_str(&format!(
            "<p>\"Others\" averages the {} members outside the top {}.</p>\n",
            breakdown.others_count,
            breakdown.top.len()
        ));
    }
    body.push_str(&footer(generated_at));
    Ok(document(&title, &body, true))
}

fn performance_table(p: Option<&PerformanceRecord>) -> String {
    let rows: [(&str, String); 11] = [
        ("Last close", fmt_price(p.map(|p| p.last_close))),
        ("Previous close", fmt_price(p.map(|p| p.prev_close))),
        ("1 day", fmt_pct(p.map(|p| p.day_change_pct))),
        ("1 month", fmt_pct(p.and_then(|p| p.month_pct))),
        ("YTD", fmt_pct(p.and_then(|p| p.ytd_pct))),
        ("1 year", fmt_pct(p.and_then(|p| p.year_pct))),
        ("3 years", fmt_pct(p.and_then(|p| p.three_year_pct))),
        ("Volatility 30d / 90d", format!(
            "{} / {}",
            fmt_vol(p.and_then(|p| p.volatility_30d)),
            fmt_vol(p.and_then(|p| p.volatility_90d))
        )),
        ("Volatility 180d / 1y", format!(
            "{} / {}",
            fmt_vol(p.and_then(|p| p.volatility_180d)),
            fmt_vol(p.and_then(|p| p.volatility_1y))
        )),
        ("52-week range", format!(
            "{} – {}",
            fmt_price(p.and_then(|p| p.week_52_low)),
            fmt_price(p.and_then(|p| p.week_52_high))
        )),
        ("From 52-week high", fmt_pct(p.and_then(|p| p.distance_from_high_pct))),
    ];
    let mut out = String::from("<table>\n");
    for (label, value) in rows {
        out.push_str(&format!("<tr><th>{label}</th><td>{}</td></tr>\n", escape(&value)));
    }
    out.push_str("</table>\n");
    out
}

fn fmt_vol(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.1}%"),
        _ => super::NOT_AVAILABLE.to_string(),
    }
}

fn evidence_section(evidence: &[Evidence]) -> String {
    if evidence.is_empty() {
        return String::new();
    }
    let mut out = String::from("<h2>Evidence</h2>\n");
    for e in evidence {
        out.push_str("<div class=\"evidence\">");
        if let Some(title) = &e.head_title {
            out.push_str(&format!("<h3>{}</h3>", escape(title)));
        }
        if let Some(text) = &e.evidence {
            out.push_str(&format!("<p>{}</p>", escape(text)));
        }
        let mut meta = Vec::new();
        if let Some(date) = e.source_date {
            meta.push(date.to_string());
        }
        if let Some(sources) = &e.sources {
            meta.push(sources.clone());
        }
        if !meta.is_empty() {
            out.push_str(&format!("<small>{}</small>", escape(&meta.join(" · "))));
        }
        out.push_str("</div>\n");
    }
    out
}

/// Chart container plus the script that draws it. Zooming the x axis rebases every line to the
/// first visible date.
// Zooming rebases every line at the first visible date, like `metrics::normalize_to_roi`.
fn chart_block(id: &str, chart: &ComparisonChart) -> anyhow::Result<String> {
    let data = embed_json(chart)?;
    let rebase = NORMALIZE_TO_ROI_JS;
    Ok(format!(
        r#"<div id="{id}" style="height:480px"></div>
<script type="application/json" id="{id}-data">{data}</script>
<script>
(function() {{
  var data = JSON.parse(document.getElementById("{id}-data").textContent);
  function traces(base) {{
    return data.lines.map(function(line) {{
      var v0 = line.values[base];
      var f0 = (v0 === null || v0 === undefined) ? 1 : 1 + v0 / 100;
      return {{
        x: data.dates,
        y: line.values.map(function(v) {{
          return (v === null || f0 === 0) ? null : {rebase};
        }}),
        name: line.label,
        mode: "lines"
      }};
    }});
  }}
  var layout = {{ yaxis: {{ ticksuffix: "%" }}, hovermode: "x unified" }};
  var el = document.getElementById("{id}");
  Plotly.newPlot(el, traces(0), layout);
  el.on("plotly_relayout", function(ev) {{
    var start = ev["xaxis.range[0]"];
    if (!start) {{ return; }}
    var base = data.dates.findIndex(function(d) {{ return d >= start.slice(0, 10); }});
    if (base < 0) {{ return; }}
    Plotly.react(el, traces(base), Object.assign({{}}, layout, {{ xaxis: {{ range: [ev["xaxis.range[0]"], ev["xaxis.range[1]"]] }} }}));
  }});
}})();
</script>
"#
    ))
}

fn footer(generated_at: DateTime<Utc>) -> String {
    format!(
        "<footer><small>Generated {}</small></footer>\n",
        generated_at.format("%Y-%m-%d %H:%M UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn profile_without_prices_shows_placeholder_and_na() {
        let html = profile_page(&ProfileView {
            symbol: "ZZZ".to_string(),
            company: None,
            performance: None,
            chart: None,
            ranks: vec![RankLink {
                theme: "AI <Chips>".to_string(),
                rank: 3,
                href: Some("/theme/AI_Chips".to_string()),
            }],
            evidence: Vec::new(),
            generated_at: at(),
        })
        .unwrap();

        assert!(html.contains("No price data available."));
        assert!(html.contains("N/A"));
        assert!(html.contains("AI &lt;Chips&gt;"));
        assert!(html.contains("href=\"/theme/AI_Chips\""));
        assert!(!html.contains("plotly"));
    }

    #[test]
    fn theme_page_links_to_charts() {
        let html = theme_page(&ThemeView {
            name: "Accelerated Computing".to_string(),
            industry: "Semiconductors".to_string(),
            members: vec![MemberRow {
                symbol: "NVDA".to_string(),
                name: Some("NVIDIA".to_string()),
                rank: 1,
                performance: None,
            }],
            evidence: Vec::new(),
            generated_at: at(),
        })
        .unwrap();

        assert!(html.contains("/theme/Accelerated_Computing/equity"));
        assert!(html.contains("/theme/Accelerated_Computing/breakdown"));
        assert!(html.contains("/profile/NVDA"));
    }

    #[test]
    fn empty_breakdown_renders_placeholder() {
        let html = breakdown_page("Empty", &Breakdown::default(), at()).unwrap();
        assert!(html.contains("No price data available."));
    }

    #[test]
    fn zoom_handler_uses_shared_rebase_expression() {
        let chart = ComparisonChart::new(vec![NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()])
            .with_line("NVDA", vec![Some(0.0)]);
        let html = chart_block("c", &chart).unwrap();

        assert!(html.contains("var f0 = (v0 === null || v0 === undefined) ? 1 : 1 + v0 / 100;"));
        assert!(html.contains(&format!("? null : {NORMALIZE_TO_ROI_JS};")));
        assert!(html.contains("plotly_relayout"));
    }
}
