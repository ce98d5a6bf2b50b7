//! Implementation of `sample-index query` and `sample-index plan`.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use csv::QuoteStyle;
use itertools::Itertools;
use thousands::Separable;

use crate::breakend::BreakendVariantQueryExecutor;
use crate::executor::{
    QueryOptions, VariantQueryExecutor, VariantQueryResult, DEFAULT_APPROXIMATE_COUNT_SAMPLING_SIZE,
};
use crate::index::config::SampleIndexConfiguration;
use crate::index::SampleIndexSchema;
use crate::query::{Variant, VariantQuery};

use super::metadata::Metadata;
use super::store::SampleIndexStore;

/// Inputs shared by the sub commands.
#[derive(clap::Args, Debug, Clone)]
pub struct InputArgs {
    /// Path to the study metadata JSON file.
    #[arg(long, required = true)]
    pub path_metadata: String,
    /// Path to the query JSON file.
    #[arg(long, required = true)]
    pub path_query: String,
    /// Path to the sample index configuration JSON file; defaults to the
    /// built-in layout.
    #[arg(long)]
    pub path_index_config: Option<String>,
}

/// Command line arguments for `sample-index query` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Run query against the sample index", long_about = None)]
pub struct Args {
    #[command(flatten)]
    pub input: InputArgs,
    /// Path to the decoded variant records, one JSON object per line.
    #[arg(long, required = true)]
    pub path_variants: String,
    /// Only count the matching variants.
    #[arg(long, default_value_t = false)]
    pub count: bool,
    /// Maximal number of variants to write.
    #[arg(long)]
    pub limit: Option<usize>,
    /// Number of variants to skip.
    #[arg(long, default_value_t = 0)]
    pub skip: usize,
    /// Number of variants fetched to estimate counts.
    #[arg(long, default_value_t = DEFAULT_APPROXIMATE_COUNT_SAMPLING_SIZE)]
    pub approximate_count_sampling_size: usize,
    /// Path to the output TSV file; stdout if missing.
    #[arg(long)]
    pub path_output: Option<String>,
    /// Path to write the residual query JSON to.
    #[arg(long)]
    pub path_residual: Option<String>,
}

/// Command line arguments for `sample-index plan` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Show the compiled sample index query", long_about = None)]
pub struct PlanArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

/// One output row.
#[derive(Debug, serde::Serialize)]
struct OutputRecord {
    chromosome: String,
    start: i32,
    end: i32,
    reference: String,
    alternate: String,
    id: String,
    file: String,
    genotypes: String,
}

impl From<&Variant> for OutputRecord {
    fn from(variant: &Variant) -> Self {
        Self {
            chromosome: variant.chromosome.clone(),
            start: variant.start,
            end: variant.end,
            reference: variant.reference.clone(),
            alternate: variant.alternate.clone(),
            id: variant.id.clone().unwrap_or_else(|| ".".into()),
            file: variant.file.clone().unwrap_or_else(|| ".".into()),
            genotypes: variant
                .genotypes
                .iter()
                .map(|(sample, gt)| format!("{}={}", sample, gt))
                .join(","),
        }
    }
}

fn load_schema(args: &InputArgs) -> Result<Arc<SampleIndexSchema>, anyhow::Error> {
    let config = match &args.path_index_config {
        Some(path) => SampleIndexConfiguration::load(path)?,
        None => SampleIndexConfiguration::default(),
    };
    Ok(Arc::new(SampleIndexSchema::new(&config)?))
}

fn load_query(path: &str) -> Result<VariantQuery, anyhow::Error> {
    let file = std::fs::File::open(path).with_context(|| format!("could not open query {}", path))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("could not parse query {}", path))
}

/// Read JSONL variant records.
fn load_variants(path: &str) -> Result<Vec<Variant>, anyhow::Error> {
    let file =
        std::fs::File::open(path).with_context(|| format!("could not open variants {}", path))?;
    let mut result = Vec::new();
    for (i, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        result.push(
            serde_json::from_str(&line)
                .with_context(|| format!("could not parse variant in line {} of {}", i + 1, path))?,
        );
    }
    Ok(result)
}

fn write_result(result: &VariantQueryResult, args: &Args) -> Result<(), anyhow::Error> {
    let sink: Box<dyn Write> = match &args.path_output {
        Some(path) => Box::new(
            std::fs::File::create(path).with_context(|| format!("could not create {}", path))?,
        ),
        None => Box::new(std::io::stdout()),
    };
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .delimiter(b'\t')
        .quote_style(QuoteStyle::Never)
        .from_writer(sink);
    for variant in &result.variants {
        writer.serialize(OutputRecord::from(variant))?;
    }
    writer.flush()?;
    Ok(())
}

/// Main entry point for `sample-index query` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    tracing::info!("Loading metadata and variants...");
    let before_loading = Instant::now();
    let schema = load_schema(&args.input)?;
    let metadata = Metadata::load(&args.input.path_metadata)?;
    let query = load_query(&args.input.path_query)?;
    let study = metadata.default_study(&query)?.name.clone();
    let variants = load_variants(&args.path_variants)?;
    let num_variants = variants.len();
    let mut store = SampleIndexStore::new(schema, metadata);
    store.load(&study, variants)?;
    tracing::info!(
        "... done loading {} variants in {:?}",
        num_variants.separate_with_commas(),
        before_loading.elapsed()
    );

    let options = QueryOptions {
        limit: if args.count { Some(0) } else { args.limit },
        skip: args.skip,
        count: args.count,
        approximate_count_sampling_size: args.approximate_count_sampling_size,
    };
    tracing::info!("Running query...");
    let before_query = Instant::now();
    let breakends = BreakendVariantQueryExecutor::new(&store);
    let result = if breakends.can_use_this_executor(&query, &options)? {
        tracing::info!("pairing breakends with their mates");
        breakends.query(&query, &options)?
    } else {
        store.query(&query, &options)?
    };
    tracing::info!("... done running query in {:?}", before_query.elapsed());

    if store.can_use_this_executor(&query, &options)? {
        let residual = store.plan(&query)?.residual(&query);
        tracing::info!("residual query: {}", serde_json::to_string(&residual)?);
        if let Some(path) = &args.path_residual {
            let file =
                std::fs::File::create(path).with_context(|| format!("could not create {}", path))?;
            serde_json::to_writer_pretty(file, &residual)?;
        }
    } else {
        tracing::info!("query is not answered by the sample index, scanned all records");
    }

    match result.num_matches {
        Some(count) => tracing::info!(
            "{}{} variants match",
            if result.approximate_count { "~" } else { "" },
            count.separate_with_commas()
        ),
        None => tracing::info!("{} variants written", result.variants.len().separate_with_commas()),
    }
    if !args.count {
        write_result(&result, args)?;
    }

    tracing::info!(
        "All of `sample-index query` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}

/// Main entry point for `sample-index plan` sub command.
pub fn run_plan(args_common: &crate::common::Args, args: &PlanArgs) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    let schema = load_schema(&args.input)?;
    let metadata = Metadata::load(&args.input.path_metadata)?;
    let query = load_query(&args.input.path_query)?;
    let store = SampleIndexStore::new(schema, metadata);
    let parsed = store.plan(&query)?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", serde_json::to_string_pretty(&parsed)?)?;
    writeln!(
        stdout,
        "{}",
        serde_json::to_string_pretty(&parsed.residual(&query))?
    )?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn output_record() {
        let variant = Variant::new("1", 100, "A", "C")
            .with_genotype("s1", "0/1")
            .with_genotype("s2", "1/1");
        let record = OutputRecord::from(&variant);
        assert_eq!(record.genotypes, "s1=0/1,s2=1/1");
        assert_eq!(record.id, ".");
    }

    #[test]
    fn variants_from_jsonl() -> Result<(), anyhow::Error> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            r#"{{"chromosome": "1", "start": 100, "end": 100, "reference": "A", "alternate": "C", "genotypes": {{"s1": "0/1"}}}}"#
        )?;
        writeln!(file)?;
        writeln!(
            file,
            r#"{{"chromosome": "2", "start": 5, "end": 7, "reference": "AGT", "alternate": "A"}}"#
        )?;
        let path = file.path().to_string_lossy().to_string();
        let variants = load_variants(&path)?;
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].genotypes["s1"], "0/1");
        assert_eq!(variants[1].end, 7);
        Ok(())
    }

    #[test]
    fn query_command() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let path = |name: &str| dir.path().join(name).to_string_lossy().to_string();
        std::fs::write(
            path("metadata.json"),
            r#"{"studies": {"study": {"name": "study", "samples": {"s1": {"name": "s1", "files": ["f1"]}}}}}"#,
        )?;
        std::fs::write(path("query.json"), r#"{"genotype": "s1:0/1"}"#)?;
        std::fs::write(
            path("variants.jsonl"),
            concat!(
                r#"{"chromosome": "1", "start": 100, "end": 100, "reference": "A", "alternate": "C", "file": "f1", "genotypes": {"s1": "0/1"}}"#,
                "\n",
                r#"{"chromosome": "1", "start": 200, "end": 200, "reference": "A", "alternate": "G", "file": "f1", "genotypes": {"s1": "1/1"}}"#,
                "\n"
            ),
        )?;
        let args = Args {
            input: InputArgs {
                path_metadata: path("metadata.json"),
                path_query: path("query.json"),
                path_index_config: None,
            },
            path_variants: path("variants.jsonl"),
            count: false,
            limit: None,
            skip: 0,
            approximate_count_sampling_size: DEFAULT_APPROXIMATE_COUNT_SAMPLING_SIZE,
            path_output: Some(path("out.tsv")),
            path_residual: Some(path("residual.json")),
        };
        run(&crate::common::Args::try_parse_from(["sample-index"])?, &args)?;

        let output = std::fs::read_to_string(path("out.tsv"))?;
        assert_eq!(
            output,
            "chromosome\tstart\tend\treference\talternate\tid\tfile\tgenotypes\n\
             1\t100\t100\tA\tC\t.\tf1\ts1=0/1\n"
        );
        let residual: VariantQuery = serde_json::from_str(&std::fs::read_to_string(path("residual.json"))?)?;
        assert!(residual.is_empty());
        Ok(())
    }
}
