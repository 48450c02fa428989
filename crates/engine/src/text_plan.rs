//! Fragment records recovered from a text `EXPLAIN ANALYZE` plan.
//!
//! Each section starts with a `Fragment <n> [<partitioning>]` header followed
//! by a block of fragment-level metrics and layout lines, then the operator
//! tree. Only the header block feeds the fragment metrics; the per-operator
//! statistics further down are kept as operator lines.

use planscope_common::{FragmentId, FragmentOperator, PlanFragment};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

static FRAGMENT_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Fragment (\d+) \[([A-Z_:]+)\]").expect("Invalid regex"));
static CPU: LazyLock<Regex> = LazyLock::new(|| duration_pattern("CPU: "));
static SCHEDULED: LazyLock<Regex> = LazyLock::new(|| duration_pattern("Scheduled: "));
static BLOCKED: LazyLock<Regex> = LazyLock::new(|| duration_pattern("Blocked "));
static INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Input: (\d+) rows? \(([^)]+)\)").expect("Invalid regex"));
static OUTPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Output: (\d+) rows? \(([^)]+)\)").expect("Invalid regex"));
static PEAK_MEMORY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Peak Memory: ([^,]+)").expect("Invalid regex"));
static TASKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Tasks count: (\d+)").expect("Invalid regex"));
static OUTPUT_LAYOUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Output layout: \[([^\]]*)\]").expect("Invalid regex"));
static OUTPUT_PARTITIONING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Output partitioning: (.+)").expect("Invalid regex"));
static BYTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9.]+)\s*([KMGT]?B)").expect("Invalid regex"));

// `ms` precedes `m` and `s` so the longest unit wins.
fn duration_pattern(label: &str) -> Regex {
    Regex::new(&format!(r"{label}([0-9.]+)(ns|us|ms|s|m|h|d)\b")).expect("Invalid regex")
}

/// Parses every fragment section, ordered by descending fragment ID.
pub fn parse_text_plan(text: &str) -> Vec<PlanFragment> {
    let mut fragments = Vec::new();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        if let Some(header) = FRAGMENT_HEADER.captures(line.trim()) {
            if let Some(section) = current.take() {
                fragments.push(section.finish());
            }
            match header[1].parse::<FragmentId>() {
                Ok(id) => current = Some(Section::new(id, &header[2], line)),
                Err(err) => warn!(header = line.trim(), error = %err, "Skipping fragment header"),
            }
        } else if let Some(section) = current.as_mut() {
            section.push(line);
        }
    }
    if let Some(section) = current {
        fragments.push(section.finish());
    }

    fragments.sort_by(|a, b| b.fragment_id.cmp(&a.fragment_id));
    debug!(count = fragments.len(), "Parsed fragments from text plan");
    fragments
}

struct Section {
    fragment: PlanFragment,
    lines: Vec<String>,
    in_header: bool,
}

impl Section {
    fn new(id: FragmentId, partitioning: &str, header: &str) -> Self {
        let mut fragment = PlanFragment::new(id);
        fragment.partitioning_type = Some(partitioning.to_string());
        Self { fragment, lines: vec![header.to_string()], in_header: true }
    }

    fn push(&mut self, line: &str) {
        self.lines.push(line.to_string());
        if is_operator_line(line) {
            self.in_header = false;
            self.fragment.operators.push(FragmentOperator::Text(line.to_string()));
        } else if self.in_header {
            self.parse_header_line(line);
        }
    }

    fn parse_header_line(&mut self, line: &str) {
        let fragment = &mut self.fragment;
        if let Some(layout) = OUTPUT_LAYOUT.captures(line) {
            fragment.output_layout = Some(layout[1].to_string());
            return;
        }
        if let Some(partitioning) = OUTPUT_PARTITIONING.captures(line) {
            fragment.output_partitioning = Some(partitioning[1].trim().to_string());
            return;
        }
        if let Some((display, ms)) = parse_duration(&CPU, line) {
            fragment.cpu_time.get_or_insert(display);
            fragment.cpu_time_ms.get_or_insert(ms);
        }
        if let Some((display, ms)) = parse_duration(&SCHEDULED, line) {
            fragment.scheduled_time.get_or_insert(display);
            fragment.scheduled_time_ms.get_or_insert(ms);
        }
        if let Some((display, ms)) = parse_duration(&BLOCKED, line) {
            fragment.blocked_time.get_or_insert(display);
            fragment.blocked_time_ms.get_or_insert(ms);
        }
        if let Some(input) = INPUT.captures(line) {
            fragment.input_rows = input[1].parse().ok();
            fragment.input_bytes = Some(input[2].to_string());
            fragment.input_bytes_value = parse_bytes(&input[2]);
        }
        if let Some(output) = OUTPUT.captures(line) {
            fragment.output_rows = output[1].parse().ok();
            fragment.output_bytes = Some(output[2].to_string());
            fragment.output_bytes_value = parse_bytes(&output[2]);
        }
        if let Some(memory) = PEAK_MEMORY.captures(line) {
            let memory = memory[1].trim();
            fragment.peak_memory = Some(memory.to_string());
            fragment.peak_memory_bytes = parse_bytes(memory);
        }
        if let Some(tasks) = TASKS.captures(line) {
            fragment.task_count = tasks[1].parse().ok();
        }
    }

    fn finish(mut self) -> PlanFragment {
        while self.lines.last().is_some_and(|line| line.trim().is_empty()) {
            self.lines.pop();
        }
        self.fragment.raw_text = Some(self.lines.join("\n"));
        self.fragment
    }
}

/// True for lines that start an operator: an identifier opening with an
/// uppercase letter, after any tree glyphs, followed by `[`, `(` or nothing.
fn is_operator_line(line: &str) -> bool {
    let body = line.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '│' | '└' | '├' | '─'));
    let end = body.find(|c: char| !(c.is_alphanumeric() || c == '_')).unwrap_or(body.len());
    let (name, rest) = body.split_at(end);
    name.starts_with(|c: char| c.is_ascii_uppercase())
        && (rest.is_empty() || rest.starts_with('[') || rest.starts_with('('))
}

/// Display string and milliseconds of a duration such as `1.50s`.
fn parse_duration(pattern: &Regex, line: &str) -> Option<(String, f64)> {
    let captures = pattern.captures(line)?;
    let value: f64 = captures[1].parse().ok()?;
    let unit = &captures[2];
    let factor = match unit {
        "ns" => 1e-6,
        "us" => 1e-3,
        "ms" => 1.0,
        "s" => 1_000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        _ => 86_400_000.0,
    };
    Some((format!("{}{unit}", &captures[1]), value * factor))
}

/// Bytes in a size such as `352.59kB`; units are 1024 based.
fn parse_bytes(size: &str) -> Option<u64> {
    let upper = size.trim().to_uppercase();
    let captures = BYTES.captures(&upper)?;
    let value: f64 = captures[1].parse().ok()?;
    let exponent = match &captures[2] {
        "B" => 0,
        "KB" => 1,
        "MB" => 2,
        "GB" => 3,
        _ => 4,
    };
    Some((value * 1024f64.powi(exponent)) as u64)
}
