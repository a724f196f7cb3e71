fn main() -> anyhow::Result<()> {
    driftnet_cli::run()
}
