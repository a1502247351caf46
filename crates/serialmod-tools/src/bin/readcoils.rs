use clap::Parser;
use serialmod_tools::common::{SerialConnectionArgs, build_client, init_tracing};

#[derive(Debug, Parser)]
#[command(name = "readcoils", about = "Read coils (FC01) or discrete inputs (FC02)")]
struct Args {
    #[command(flatten)]
    conn: SerialConnectionArgs,
    #[arg(long, default_value_t = 1)]
    slave: u8,
    #[arg(long)]
    start: u16,
    #[arg(long)]
    quantity: u16,
    /// Read discrete inputs instead of coils.
    #[arg(long)]
    discrete: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    let client = build_client(&args.conn)?;

    let (label, values) = if args.discrete {
        let values = client
            .read_discrete_inputs(args.slave, args.start, args.quantity)
            .await?;
        ("input", values)
    } else {
        let values = client
            .read_coils(args.slave, args.start, args.quantity)
            .await?;
        ("coil", values)
    };

    for (idx, value) in values.iter().enumerate() {
        println!("{label}={} value={}", args.start + idx as u16, u8::from(*value));
    }
    Ok(())
}
