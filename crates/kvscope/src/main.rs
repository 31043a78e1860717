use std::{ffi::OsString, io, path::PathBuf};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use kvscope::{Config, DEFAULT_MIN_COUNT, DEFAULT_PREFIX_LEN};
use kvscope_store::StoreOptions;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Report key-prefix statistics of a kvscope store")]
struct Cli {
    /// Store directory
    store_dir: PathBuf,

    /// Literal key prefixes to count and size individually
    #[arg(allow_hyphen_values = true)]
    prefixes: Vec<OsString>,

    /// Window, in bytes, used to group keys into top prefixes
    #[arg(long, default_value_t = DEFAULT_PREFIX_LEN)]
    prefix_len: usize,

    /// Print top prefixes seen more than this many times
    #[arg(long, default_value_t = DEFAULT_MIN_COUNT)]
    min_count: u64,

    /// Character ending a grouping prefix
    #[arg(long, default_value_t = '/')]
    separator: char,

    /// Print top prefixes by descending count
    #[arg(long)]
    sort: bool,

    /// Open without taking the store lock, alongside a running writer
    #[arg(long)]
    read_only: bool,

    /// Skip block checksum verification
    #[arg(long)]
    no_verify_checksums: bool,

    /// Block cache capacity, in blocks. 0 disables the cache
    #[arg(long, default_value_t = 1024)]
    cache_blocks: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args_os()
        .skip(1)
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let cli = Cli::parse();
    ensure!(
        cli.separator.is_ascii(),
        "separator must be a single ASCII character, got {:?}",
        cli.separator
    );

    let config = Config::new(cli.store_dir)
        .prefixes(cli.prefixes.into_iter().map(OsString::into_encoded_bytes))
        .prefix_len(cli.prefix_len)
        .min_count(cli.min_count)
        .separator(cli.separator as u8)
        .sort(cli.sort)
        .store_options(
            StoreOptions::new()
                .read_only(cli.read_only)
                .verify_checksums(!cli.no_verify_checksums)
                .cache_blocks(cli.cache_blocks),
        );

    let stdout = io::stdout();
    kvscope::run(&config, &args, &mut stdout.lock())
        .with_context(|| format!("kvscope failed on {}", config.store_dir.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_may_start_with_a_hyphen() {
        let cli = Cli::try_parse_from(["kvscope", "--read-only", "/tmp/store", "-foo", "a/"]).unwrap();
        assert_eq!(cli.store_dir, PathBuf::from("/tmp/store"));
        assert_eq!(cli.prefixes, vec![OsString::from("-foo"), OsString::from("a/")]);
        assert!(cli.read_only);
    }

    #[cfg(unix)]
    #[test]
    fn prefixes_keep_non_utf8_bytes() {
        use std::os::unix::ffi::OsStringExt;

        let raw = OsString::from_vec(vec![0xff, b'/']);
        let cli = Cli::try_parse_from([OsString::from("kvscope"), OsString::from("/tmp"), raw]).unwrap();
        let config = Config::new(cli.store_dir)
            .prefixes(cli.prefixes.into_iter().map(OsString::into_encoded_bytes));
        assert_eq!(config.prefixes, vec![vec![0xff, b'/']]);
    }
}
