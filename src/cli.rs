use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fieldprof")]
#[command(about = "Attribute heap-profile access histograms to the fields of allocated types")]
#[command(version)]
pub struct Cli {
    /// Run on a local raw heap profile (required; other modes are external)
    #[arg(long)]
    pub local: bool,

    /// Path to the raw profile
    #[arg(long)]
    pub memprof_profile: Option<PathBuf>,

    /// Path to the profiled binary
    #[arg(long)]
    pub memprof_profiled_binary: Option<PathBuf>,

    /// Path to the split debug file of the profiled binary (defaults to the binary)
    #[arg(long)]
    pub memprof_profiled_binary_dwarf: Option<PathBuf>,

    /// Include-list of type-name prefixes; empty selects all types
    #[arg(long, value_delimiter = ',')]
    pub type_prefix_filter: Vec<String>,

    /// Include-list of mangled function names; empty selects all call stacks
    #[arg(long, value_delimiter = ',')]
    pub callstack_filter: Vec<String>,

    /// Keep only record (class/struct) root types in the output
    #[arg(long)]
    pub only_records: bool,

    /// Print verbose diagnostics while verifying type trees
    #[arg(long)]
    pub verify_verbose: bool,

    /// Dump call stacks whose type could not be resolved instead of type trees
    #[arg(long)]
    pub dump_unresolved_callstacks: bool,

    /// Emit a flamegraph instead of the textual dump
    #[arg(long)]
    pub flamegraph: bool,

    /// Limit on the number of entries to dump; negative means unbounded
    #[arg(long, default_value = "-1")]
    pub limit: i64,

    /// Log per-run statistics about resolution and attribution
    #[arg(long)]
    pub stats: bool,

    /// Worker count for the DWARF unit walk
    #[arg(long, default_value = "1")]
    pub parse_thread_count: u32,

    /// Output destination; defaults to standard output
    #[arg(long)]
    pub out: Option<PathBuf>,
}

impl Cli {
    pub fn validate(&self) -> Result<(), String> {
        if !self.local {
            return Err("--local is the only supported mode".to_string());
        }
        if self.memprof_profile.is_none() {
            return Err("--memprof-profile is required in --local mode".to_string());
        }
        if self.memprof_profiled_binary.is_none() {
            return Err("--memprof-profiled-binary is required in --local mode".to_string());
        }
        if self.parse_thread_count == 0 {
            return Err("--parse-thread-count must be at least 1".to_string());
        }
        Ok(())
    }

    /// Split-debug path, falling back to the binary itself.
    pub fn dwarf_path(&self) -> Option<PathBuf> {
        self.memprof_profiled_binary_dwarf
            .clone()
            .or_else(|| self.memprof_profiled_binary.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_requires_local_mode() {
        let cli = Cli::parse_from(["fieldprof"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn validate_requires_profile_and_binary() {
        let cli = Cli::parse_from(["fieldprof", "--local"]);
        assert!(cli.validate().is_err());

        let cli = Cli::parse_from([
            "fieldprof",
            "--local",
            "--memprof-profile",
            "p.jsonl",
            "--memprof-profiled-binary",
            "a.out",
        ]);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn dwarf_path_defaults_to_binary() {
        let cli = Cli::parse_from([
            "fieldprof",
            "--local",
            "--memprof-profile",
            "p.jsonl",
            "--memprof-profiled-binary",
            "a.out",
        ]);
        assert_eq!(cli.dwarf_path(), Some(PathBuf::from("a.out")));
    }
}
