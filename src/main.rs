fn main() {
    #[cfg(feature = "cli")]
    dbpf_merge::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("dbpf-merge: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
