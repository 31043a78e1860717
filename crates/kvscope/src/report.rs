use std::io::Write;

use kvscope_store::Store;
use tracing::{error, info};

use crate::{
    config::Config,
    error::{AnalyzeError, AnalyzeResult},
    range::analyze_prefix,
    top::top_prefixes_with,
    view::SnapshotSource,
};

/// Echo `args`, open the store named by `config` and write the full report to `out`.
///
/// Output, one item per line:
///
/// ```text
/// [<args joined by spaces>]
/// <prefix> <count>                           for each top prefix above the threshold
/// Prefix '<p>': <count> keys, <size> bytes   for each requested prefix
/// ```
///
/// The first error stops the run. Lines written before it stay written.
pub fn run<W: Write>(config: &Config, args: &[String], out: &mut W) -> AnalyzeResult<()> {
    writeln!(out, "[{}]", args.join(" "))?;
    let store = Store::open(&config.store_dir, config.store_options.clone()).map_err(|source| {
        error!(dir = %config.store_dir.display(), error = %source, "cannot open store");
        AnalyzeError::Open {
            path: config.store_dir.clone(),
            source,
        }
    })?;
    info!(
        dir = %config.store_dir.display(),
        tables = store.table_count(),
        "store opened"
    );
    report(&store, config, out)
}

/// Write the top prefixes and the per-prefix lines of `source` to `out`.
///
/// Every scan runs against its own snapshot, released before the next one is taken.
pub fn report<S, W>(source: &S, config: &Config, out: &mut W) -> AnalyzeResult<()>
where
    S: SnapshotSource,
    W: Write,
{
    let table = source
        .view(|snapshot| top_prefixes_with(snapshot, config.prefix_len, config.separator))
        .map_err(|e| {
            error!(error = %e.backend(), "top-prefix scan failed");
            AnalyzeError::TopPrefixes(e)
        })?;

    if config.sort {
        for (prefix, count) in table.sorted_desc() {
            if count > config.min_count {
                writeln!(out, "{} {}", String::from_utf8_lossy(prefix), count)?;
            }
        }
    } else {
        for (prefix, count) in table.above(config.min_count) {
            writeln!(out, "{} {}", String::from_utf8_lossy(prefix), count)?;
        }
    }

    for prefix in &config.prefixes {
        let shown = String::from_utf8_lossy(prefix);
        let report = source
            .view(|snapshot| analyze_prefix(snapshot, prefix))
            .map_err(|e| {
                error!(prefix = %shown, error = %e.backend(), "prefix scan failed");
                AnalyzeError::Prefix {
                    prefix: shown.clone().into_owned(),
                    source: e,
                }
            })?;
        writeln!(
            out,
            "Prefix '{}': {} keys, {} bytes",
            shown, report.count, report.size
        )?;
    }

    out.flush()?;
    Ok(())
}
