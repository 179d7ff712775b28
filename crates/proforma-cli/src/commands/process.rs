//! Process command - extract stock from a single proforma file.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::{debug, info};

use proforma_core::{ExtractResult, StockExtractor};

use super::load_config;

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input PDF file
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output, one row per stock item
    Csv,
    /// Plain text summary
    Text,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let extension = args
        .input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if extension != "pdf" {
        anyhow::bail!("Unsupported file format: {}", extension);
    }

    info!("Processing file: {}", args.input.display());

    let data = fs::read(&args.input)?;
    let result = StockExtractor::new()
        .with_table_settings(config.table)
        .extract_bytes(&data)?;

    let output = format_result(&result, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

fn format_result(result: &ExtractResult, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(result)?),
        OutputFormat::Csv => format_csv(result),
        OutputFormat::Text => Ok(format_text(result)),
    }
}

/// Flattened stock rows: item columns followed by the repeated header.
fn format_csv(result: &ExtractResult) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "line_number",
        "description",
        "unit",
        "quantity",
        "unit_price",
        "value",
        "vat",
        "proforma_number",
        "serie",
        "date",
        "currency",
        "supplier",
    ])?;

    for row in result.stock_rows() {
        let (item, metadata) = (row.item, row.metadata);
        wtr.write_record([
            &item.line_number.to_string(),
            &item.description,
            &item.unit,
            &item.quantity.to_string(),
            &item.unit_price.to_string(),
            &item.value.to_string(),
            &item.vat.to_string(),
            &metadata.proforma_number,
            &metadata.serie,
            &metadata.date,
            &metadata.currency,
            &metadata.supplier,
        ])?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(result: &ExtractResult) -> String {
    let metadata = &result.metadata;
    let mut output = String::new();

    output.push_str(&format!("Proforma: {}\n", metadata.proforma_number));
    output.push_str(&format!("Serie:    {}\n", metadata.serie));
    output.push_str(&format!("Date:     {}\n", metadata.date));
    output.push_str(&format!("Currency: {}\n", metadata.currency));
    output.push_str(&format!("Supplier: {}\n", metadata.supplier));
    output.push('\n');

    output.push_str(&format!("Items ({}):\n", result.items.len()));
    for item in &result.items {
        output.push_str(&format!(
            "  {:>3}. {} - {} {} @ {} / {} (VAT {})\n",
            item.line_number,
            item.description,
            item.quantity,
            item.unit,
            item.unit_price,
            item.value,
            item.vat
        ));
    }

    output
}
