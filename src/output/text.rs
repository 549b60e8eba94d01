//! Plain-text report rendering.
//!
//! Every row carries inclusive and exclusive percentages of the frame
//! thread's frame time, the fps the row's inclusive time alone would allow,
//! and calls per frame.

use std::fmt::Write;

use crate::aggregator::{CallTree, FunctionStat, RunProfile};
use crate::utils::config::{
    REPORT_DETAILED, REPORT_FUNCTIONS, REPORT_NO_RECURSION, REPORT_THREAD_ROOTS,
};

const MAX_INDENT: usize = 128;
const DATA_WIDTH: usize = 39;

/// Frame totals every row is measured against
#[derive(Debug, Clone, Copy, Default)]
struct FrameAnchor {
    realtime_ns: u64,
    count: u64,
}

struct Row {
    first: i64,
    name: String,
    realtime_ns: u64,
    children_realtime_ns: u64,
    count: u64,
}

fn indent(stack_level: i32) -> usize {
    (2 * stack_level.max(0) as usize).min(MAX_INDENT)
}

fn display_name(name: &str, stack_level: i32, recursions: u32) -> String {
    let mut out = " ".repeat(indent(stack_level));
    out.push_str(name);
    if recursions > 0 {
        let _ = write!(out, "[+{}]", recursions);
    }
    out
}

fn tree_rows(tree: &CallTree, label: &str) -> Vec<Row> {
    tree.preorder()
        .into_iter()
        .map(|id| {
            let node = tree.node(id);
            let name = if node.is_root() { label } else { node.name.as_str() };
            Row {
                first: node.stack_level as i64,
                name: display_name(name, node.stack_level, node.recursions),
                realtime_ns: node.realtime_ns,
                children_realtime_ns: tree.children_realtime_ns(id),
                count: node.count,
            }
        })
        .collect()
}

fn stat_rows(stats: &[FunctionStat]) -> Vec<Row> {
    stats
        .iter()
        .enumerate()
        .map(|(idx, stat)| Row {
            first: idx as i64 + 1,
            name: display_name(&stat.name, 0, stat.recursions),
            realtime_ns: stat.realtime_ns,
            children_realtime_ns: stat.children_realtime_ns,
            count: stat.count,
        })
        .collect()
}

fn format_row(row: &Row, anchor: FrameAnchor, width: usize) -> String {
    let (inc, exc, fps) = if anchor.realtime_ns > 0 {
        let total = anchor.realtime_ns as f64;
        let inc = 100.0 * row.realtime_ns as f64 / total;
        let exc = inc - 100.0 * row.children_realtime_ns as f64 / total;
        let fps = if row.realtime_ns > 0 {
            1e9 * anchor.count as f64 / row.realtime_ns as f64
        } else {
            0.0
        };
        (
            format!("{:6.2}", inc),
            format!("{:6.2}", exc),
            format!("{:10.1}", fps),
        )
    } else {
        (format!("{:>6}", "-"), format!("{:>6}", "-"), format!("{:>10}", "-"))
    };
    let per_frame = if anchor.count > 0 {
        format!("{:9.2}", row.count as f64 / anchor.count as f64)
    } else {
        format!("{:>9}", "-")
    };
    format!(
        "{:>3} {:<width$} {} {} {} {}",
        row.first,
        row.name,
        inc,
        exc,
        fps,
        per_frame,
        width = width
    )
}

fn write_section(out: &mut String, title: &str, first_column: &str, groups: &[Vec<Row>], anchor: FrameAnchor) {
    let width = groups
        .iter()
        .flatten()
        .map(|r| r.name.len())
        .max()
        .unwrap_or(0)
        .max("name".len());
    let delim = "-".repeat(width + DATA_WIDTH);

    let _ = writeln!(out, "{}", delim);
    let _ = writeln!(out, "{} [ {} thread(s) ]", title, groups.len());
    let _ = writeln!(out, "{}", delim);
    let _ = writeln!(
        out,
        "{:>3} {:<width$} {:>6} {:>6} {:>10} {:>9}",
        first_column,
        "name",
        "inc%",
        "exc%",
        "fps",
        "call/fr",
        width = width
    );
    for row in groups.iter().flatten() {
        let _ = writeln!(out, "{}", format_row(row, anchor, width));
    }
    out.push('\n');
}

fn thread_label(thread_id: u32) -> String {
    format!("<thread {}>", thread_id)
}

/// Render the report sections selected by `sections` (a `REPORT_*` bitmask)
pub fn render_report(run: &RunProfile, sections: u32) -> String {
    let anchor = run
        .frame_thread()
        .map(|t| FrameAnchor {
            realtime_ns: t.frame_time_ns(),
            count: t.frame_count(),
        })
        .unwrap_or_default();
    let mut out = String::new();

    if sections & REPORT_THREAD_ROOTS != 0 {
        let groups: Vec<Vec<Row>> = run
            .threads
            .iter()
            .map(|t| {
                let mut rows = tree_rows(&t.full, &thread_label(t.thread_id));
                rows.truncate(1);
                rows
            })
            .collect();
        write_section(&mut out, "Threads summary", "st", &groups, anchor);
    }
    if sections & REPORT_DETAILED != 0 {
        let groups: Vec<Vec<Row>> = run
            .threads
            .iter()
            .map(|t| tree_rows(&t.full, &thread_label(t.thread_id)))
            .collect();
        write_section(&mut out, "Detailed report", "st", &groups, anchor);
    }
    if sections & REPORT_NO_RECURSION != 0 {
        let groups: Vec<Vec<Row>> = run
            .threads
            .iter()
            .map(|t| tree_rows(&t.collapsed, &thread_label(t.thread_id)))
            .collect();
        write_section(&mut out, "Summary report (no recursion)", "st", &groups, anchor);
    }
    if sections & REPORT_FUNCTIONS != 0 {
        let groups: Vec<Vec<Row>> = run.threads.iter().map(|t| stat_rows(&t.stats)).collect();
        write_section(&mut out, "Functions", "idx", &groups, anchor);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{analyze_log, AnalysisOptions};
    use crate::capture::{Event, EventLog};
    use crate::utils::config::REPORT_ALL;

    fn run() -> RunProfile {
        let mut log = EventLog::default();
        let mut events = Vec::new();
        for i in 0..4u64 {
            let base = i * 10_000_000;
            events.push(Event::new("frame", 0, base, base + 10_000_000).with_frame(true));
            events.push(Event::new("draw", 1, base, base + 5_000_000));
        }
        log.threads.insert(0, events);
        log.threads.insert(1, vec![Event::new("io", 0, 0, 1_000)]);
        analyze_log(&log, &AnalysisOptions::new().with_mitigation(false)).unwrap()
    }

    #[test]
    fn test_display_name_indent_and_recursion() {
        assert_eq!(display_name("R", 2, 3), "    R[+3]");
        assert_eq!(display_name("<root>", -1, 0), "<root>");
    }

    #[test]
    fn test_detailed_rows() {
        let text = render_report(&run(), REPORT_DETAILED);
        assert!(text.contains("Detailed report [ 2 thread(s) ]"));

        let draw = text.lines().find(|l| l.contains(" draw")).unwrap();
        let cols: Vec<&str> = draw.split_whitespace().collect();
        // st, name, inc%, exc%, fps, call/fr
        assert_eq!(cols, vec!["1", "draw", "50.00", "50.00", "200.0", "1.00"]);

        let frame = text.lines().find(|l| l.contains(" frame")).unwrap();
        let cols: Vec<&str> = frame.split_whitespace().collect();
        assert_eq!(cols, vec!["0", "frame", "100.00", "50.00", "100.0", "1.00"]);
    }

    #[test]
    fn test_section_selection() {
        let text = render_report(&run(), REPORT_THREAD_ROOTS | REPORT_FUNCTIONS);
        assert!(text.contains("Threads summary"));
        assert!(text.contains("Functions"));
        assert!(!text.contains("Detailed report"));
        assert!(!text.contains("no recursion"));

        let all = render_report(&run(), REPORT_ALL);
        assert_eq!(all.matches(" thread(s) ]").count(), 4);
    }
}
