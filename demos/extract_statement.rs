use anyhow::{bail, Context};
use financial_statement_extractor::{
    DocumentText, ExtractorConfig, ResultCache, StatementProcessor, StatementType,
};
use std::sync::Arc;

// Usage: extract_statement <text-dump> [config.json]
//
// The dump is the plain text of a report with pages separated by form feeds,
// as written by `pdftotext -layout`.
fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: extract_statement <text-dump> [config.json]");
    };

    let config = match args.next() {
        Some(config_path) => ExtractorConfig::from_path(&config_path)
            .with_context(|| format!("loading configuration from {}", config_path))?,
        None => ExtractorConfig::standard(),
    };

    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    let doc = DocumentText::from_text_dump(path.clone(), &text);
    println!(
        "{}: {} pages, {} lines\n",
        doc.id,
        doc.page_count(),
        doc.line_count()
    );

    let processor = StatementProcessor::new(config, Arc::new(ResultCache::new()))?;
    println!("{}", processor.report(&doc));

    let extraction = processor.extract(&doc);
    for statement_type in StatementType::ALL {
        if let Some(table) = extraction.table(statement_type) {
            for note in &table.notes {
                println!("[{}] {:?}", statement_type, note);
            }
        }
    }

    Ok(())
}
