//! Terminal rendering: boxed banners and per-step badges.

use crate::core::evidence::EvidencePack;
use crate::core::output::compact_line;
use crate::core::validate::ValidationReport;
use colored::{ColoredString, Colorize};
use std::env;

const MIN_BOX_WIDTH: usize = 40;
const MAX_BOX_WIDTH: usize = 60;
const MAX_DETAIL_CHARS: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoxStyle {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Badge {
    Pass,
    Fail,
    Skip,
    Warn,
    Info,
}

impl Badge {
    pub fn icon(&self) -> &'static str {
        match self {
            Badge::Pass => "✅",
            Badge::Fail => "❌",
            Badge::Skip => "⏭",
            Badge::Warn => "⚠️",
            Badge::Info => "💡",
        }
    }

    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("pass") => Badge::Pass,
            Some("fail") => Badge::Fail,
            Some("skip") => Badge::Skip,
            Some("warn") => Badge::Warn,
            _ => Badge::Info,
        }
    }

    fn paint(&self, s: &str) -> ColoredString {
        match self {
            Badge::Pass => s.bright_green(),
            Badge::Fail => s.bright_red(),
            Badge::Skip => s.bright_black(),
            Badge::Warn => s.bright_yellow(),
            Badge::Info => s.cyan(),
        }
    }
}

pub fn terminal_width() -> usize {
    env::var("TERM_WIDTH")
        .ok()
        .and_then(|w| w.parse().ok())
        .or_else(|| env::var("COLUMNS").ok().and_then(|c| c.parse().ok()))
        .unwrap_or(80)
}

fn effective_width() -> usize {
    terminal_width().clamp(MIN_BOX_WIDTH, MAX_BOX_WIDTH)
}

pub fn box_top(width: usize) -> String {
    format!("╔{}╗", "═".repeat(width.saturating_sub(2)))
}

pub fn box_bottom(width: usize) -> String {
    format!("╚{}╝", "═".repeat(width.saturating_sub(2)))
}

pub fn box_row(content: &str, width: usize) -> String {
    let padding = width.saturating_sub(2).saturating_sub(content.chars().count());
    let left = padding / 2;
    format!(
        "║{}{}{}║",
        " ".repeat(left),
        content,
        " ".repeat(padding - left)
    )
}

fn paint(style: BoxStyle, s: &str) -> ColoredString {
    match style {
        BoxStyle::Info => s.bright_cyan(),
        BoxStyle::Success => s.bright_green(),
        BoxStyle::Warning => s.bright_yellow(),
        BoxStyle::Error => s.bright_red(),
    }
}

pub fn render_box(title: &str, subtitle: &str, style: BoxStyle) {
    let width = effective_width();
    println!("{}", paint(style, &box_top(width)));
    println!("{}", paint(style, &box_row(title, width)).bold());
    if !subtitle.is_empty() {
        println!("{}", paint(style, &box_row(subtitle, width)));
    }
    println!("{}", paint(style, &box_bottom(width)));
}

pub fn print_section(title: &str) {
    println!();
    println!("  {}", title.bold());
}

pub fn print_badge_line(badge: Badge, message: &str) {
    println!("  {} {}", badge.paint(badge.icon()), message);
}

/// One line per step: `<tool_id> <status> (<ms> ms) - <detail>`.
pub fn step_lines(pack: &EvidencePack) -> Vec<(Badge, String)> {
    pack.runs
        .iter()
        .map(|r| {
            let badge = Badge::from_label(r.status.as_deref());
            let mut line = format!(
                "{:<15} {:<4} ({} ms)",
                r.tool_id,
                r.status.as_deref().unwrap_or("?"),
                r.duration_ms
            );
            if let Some(detail) = &r.detail {
                line.push_str(" - ");
                line.push_str(&compact_line(detail, MAX_DETAIL_CHARS));
            }
            (badge, line)
        })
        .collect()
}

pub fn render_gate(pack: &EvidencePack, report: &ValidationReport) {
    let token = report.proof_token.as_deref().unwrap_or("(none)");
    if report.ok {
        render_box("PROOF GATE: PASS", token, BoxStyle::Success);
    } else {
        render_box("PROOF GATE: FAIL", token, BoxStyle::Error);
    }

    print_section("Steps");
    for (badge, line) in step_lines(pack) {
        print_badge_line(badge, &line);
    }
    if let Some(step) = &pack.aborted_at {
        print_badge_line(Badge::Warn, &format!("sequence aborted at {}", step));
    }

    if !report.errors.is_empty() {
        print_section("Errors");
        for e in &report.errors {
            print_badge_line(Badge::Fail, e);
        }
    }
    if !report.warnings.is_empty() {
        print_section("Warnings");
        for w in &report.warnings {
            print_badge_line(Badge::Warn, w);
        }
    }
    if !report.required_actions.is_empty() {
        print_section("Required actions");
        for a in &report.required_actions {
            let mut line = format!("{} @ {}", a.action, a.location);
            if !a.value.is_empty() {
                line.push_str(&format!(": {}", a.value));
            }
            print_badge_line(Badge::Info, &line);
        }
    }
    println!();
}
