use clap::Parser;
use serialmod_tools::common::{SerialConnectionArgs, build_client, init_tracing, parse_bool};

#[derive(Debug, Parser)]
#[command(
    name = "writecoil",
    about = "Write one coil (FC05) or a run of coils (FC15)"
)]
struct Args {
    #[command(flatten)]
    conn: SerialConnectionArgs,
    /// 0 broadcasts the write; no reply is awaited.
    #[arg(long, default_value_t = 1)]
    slave: u8,
    #[arg(long)]
    address: u16,
    #[arg(long, value_parser = parse_bool, value_delimiter = ',', num_args = 1..)]
    values: Vec<bool>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    let client = build_client(&args.conn)?;

    match args.values.as_slice() {
        [value] => {
            client
                .write_single_coil(args.slave, args.address, *value)
                .await?
        }
        values => {
            client
                .write_multiple_coils(args.slave, args.address, values)
                .await?
        }
    }

    println!(
        "wrote {} coil(s) starting at {}",
        args.values.len(),
        args.address
    );
    Ok(())
}
