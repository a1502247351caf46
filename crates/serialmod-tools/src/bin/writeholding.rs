use clap::Parser;
use serialmod_core::numeric::{WordOrder, split_u32};
use serialmod_tools::common::{
    SerialConnectionArgs, build_client, init_tracing, parse_word_order,
};

#[derive(Debug, Parser)]
#[command(
    name = "writeholding",
    about = "Write one or more holding registers (FC06/FC16)"
)]
struct Args {
    #[command(flatten)]
    conn: SerialConnectionArgs,
    /// 0 broadcasts the write; no reply is awaited.
    #[arg(long, default_value_t = 1)]
    slave: u8,
    #[arg(long)]
    start: u16,
    /// Register values; with --u32 each value fills two registers.
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    values: Vec<u32>,
    /// Treat each value as 32 bits and write it as two registers.
    #[arg(long = "u32")]
    wide: bool,
    #[arg(long, default_value = "big", value_parser = parse_word_order)]
    word_order: WordOrder,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let registers: Vec<u16> = if args.wide {
        args.values
            .iter()
            .flat_map(|value| split_u32(*value, args.word_order))
            .collect()
    } else {
        args.values
            .iter()
            .map(|value| {
                u16::try_from(*value).map_err(|_| format!("{value} does not fit in a register"))
            })
            .collect::<Result<_, _>>()?
    };

    let client = build_client(&args.conn)?;
    match registers.as_slice() {
        [value] => {
            client
                .write_single_register(args.slave, args.start, *value)
                .await?
        }
        values => {
            client
                .write_multiple_registers(args.slave, args.start, values)
                .await?
        }
    }

    println!(
        "wrote {} register(s) starting at {}",
        registers.len(),
        args.start
    );
    Ok(())
}
