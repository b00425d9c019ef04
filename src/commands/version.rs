pub fn run() -> anyhow::Result<()> {
    println!("chaos-operator {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
