use lsh_dedup_labeler::dto::{Dataset, FieldDefinition};
use std::io::Write;

/// Prints the import grid (column, type, has missing) followed by the first
/// `rows` records.
pub fn render_preview<W: Write>(
    output: &mut W,
    dataset: &Dataset,
    fields: &[FieldDefinition],
    rows: usize,
) -> std::io::Result<()> {
    let column_width = dataset
        .columns
        .iter()
        .map(|c| c.chars().count())
        .max()
        .unwrap_or(0)
        .max("column".len());

    writeln!(output, "{} records, {} columns", dataset.len(), dataset.columns.len())?;
    writeln!(output)?;
    writeln!(
        output,
        "{:<cw$}  {:<9}  {:<11}  {}",
        "column",
        "type",
        "has missing",
        "blank values",
        cw = column_width
    )?;
    for column in &dataset.columns {
        let definition = fields.iter().find(|f| &f.field == column);
        let kind = definition.map_or_else(|| "-".to_string(), |d| d.kind.to_string());
        let has_missing = definition.map_or(false, |d| d.has_missing);
        let blanks = dataset.blank_count(column);
        writeln!(
            output,
            "{:<cw$}  {:<9}  {:<11}  {}",
            column,
            kind,
            has_missing,
            blanks,
            cw = column_width
        )?;
    }

    if rows == 0 || dataset.is_empty() {
        return Ok(());
    }
    writeln!(output)?;
    let shown = &dataset.records[..rows.min(dataset.len())];
    let widths: Vec<usize> = dataset
        .columns
        .iter()
        .map(|column| {
            shown
                .iter()
                .map(|r| r.value(column).chars().count())
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();
    let id_width = shown.iter().map(|r| r.id.chars().count()).max().unwrap_or(0).max(2);

    let header: Vec<String> = dataset
        .columns
        .iter()
        .zip(&widths)
        .map(|(column, &width)| format!("{:<width$}", column))
        .collect();
    writeln!(output, "{:<id_width$}  {}", "id", header.join("  ").trim_end())?;
    for record in shown {
        let cells: Vec<String> = dataset
            .columns
            .iter()
            .zip(&widths)
            .map(|(column, &width)| format!("{:<width$}", record.value(column)))
            .collect();
        writeln!(output, "{:<id_width$}  {}", record.id, cells.join("  ").trim_end())?;
    }
    Ok(())
}
