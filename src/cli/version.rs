/// Display version information
pub fn execute() {
    println!("quorate {}", env!("CARGO_PKG_VERSION"));
    println!("Operator CLI for the quorum-gated authorization engine");
}
