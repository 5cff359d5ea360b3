use backstop_core::model::{Configuration, Metrics, Rule, ScanStatus};
use comfy_table::{Cell, ContentArrangement, Table};

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

fn joined(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

pub fn render_status(status: &ScanStatus) -> String {
    match status {
        ScanStatus::Idle => "Scan status: idle".to_string(),
        ScanStatus::Scanning {
            current_path,
            found,
        } => format!("Scan status: scanning\nCurrent path: {current_path}\nFound: {found}"),
        ScanStatus::Result(batch) => format!(
            "Scan status: result\nNew exclusions: {}\nExclusions to lift: {}",
            batch.add.len(),
            batch.remove.len()
        ),
    }
}

pub fn render_config(config: &Configuration) -> String {
    let mut rules = table(vec!["Rule", "Kind", "Excludes", "If exists", "Merges"]);
    for (name, rule) in &config.rules {
        let kind = rule.kind().label();
        let row = match rule {
            Rule::Concrete(concrete) => vec![
                Cell::new(name),
                Cell::new(kind),
                Cell::new(joined(&concrete.excludes)),
                Cell::new(joined(&concrete.if_exists)),
                Cell::new("-"),
            ],
            Rule::Merge(merged) => vec![
                Cell::new(name),
                Cell::new(kind),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new(joined(merged)),
            ],
        };
        rules.add_row(row);
    }

    let mut directories = table(vec!["Directory", "Rules"]);
    for directory in &config.directories {
        directories.add_row(vec![
            Cell::new(&directory.path),
            Cell::new(joined(&directory.rules)),
        ]);
    }

    let mut skips = table(vec!["Skipped path"]);
    for skip in &config.skips {
        skips.add_row(vec![Cell::new(skip)]);
    }

    format!(
        "{rules}\n{directories}\n{skips}\nNo include: {}",
        if config.no_include { "on" } else { "off" }
    )
}

pub fn render_metrics(metrics: &Metrics) -> String {
    let mut table = table(vec!["Metric", "Value"]);
    let last_excluded = if metrics.last_excluded.is_empty() {
        "-".to_string()
    } else {
        metrics.last_excluded.clone()
    };
    table.add_row(vec![
        Cell::new("Files excluded"),
        Cell::new(metrics.files_excluded),
    ]);
    table.add_row(vec![
        Cell::new("Files included"),
        Cell::new(metrics.files_included),
    ]);
    table.add_row(vec![Cell::new("Last excluded"), Cell::new(last_excluded)]);
    table.add_row(vec![
        Cell::new("Last excluded at (unix)"),
        Cell::new(metrics.last_excluded_time),
    ]);
    table.to_string()
}
