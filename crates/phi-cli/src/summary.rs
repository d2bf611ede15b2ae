use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use phi_model::{BatchResult, BatchState};

pub fn print_summary(result: &BatchResult) {
    println!("Batch: {}", result.batch_id);

    let mut table = Table::new();
    table.set_header(vec![header_cell("Metric"), header_cell("Count")]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);

    table.add_row(vec![Cell::new("Total records"), Cell::new(result.total_records)]);
    table.add_row(vec![
        Cell::new("Accepted"),
        count_cell(result.accepted, Color::Green),
    ]);
    table.add_row(vec![
        Cell::new("Rejected"),
        count_cell(result.rejected, Color::Red),
    ]);
    table.add_row(vec![
        Cell::new("Encryption errors"),
        count_cell(result.encryption_failures, Color::Red),
    ]);
    table.add_row(vec![
        Cell::new("Redacted fields"),
        count_cell(result.redacted_field_count, Color::Yellow),
    ]);
    table.add_row(vec![
        Cell::new("Skipped"),
        count_cell(result.skipped, Color::Yellow),
    ]);
    println!("{table}");

    println!("State: {}", state_label(result.state));
    println!("Duration: {} ms", result.duration_ms());
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(100);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        Cell::new(count).fg(Color::DarkGrey)
    }
}

fn state_label(state: BatchState) -> &'static str {
    match state {
        BatchState::Completed => "completed",
        BatchState::PartiallyFailed => "partially failed",
        BatchState::Failed => "failed",
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}
