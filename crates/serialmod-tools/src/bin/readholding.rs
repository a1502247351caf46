use clap::{Parser, ValueEnum};
use serialmod_core::numeric::{WordOrder, combine_u32, to_signed16, to_signed32};
use serialmod_tools::common::{
    SerialConnectionArgs, build_client, init_tracing, parse_word_order,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    U16,
    I16,
    U32,
    I32,
}

#[derive(Debug, Parser)]
#[command(
    name = "readholding",
    about = "Read holding (FC03) or input (FC04) registers"
)]
struct Args {
    #[command(flatten)]
    conn: SerialConnectionArgs,
    #[arg(long, default_value_t = 1)]
    slave: u8,
    #[arg(long)]
    start: u16,
    #[arg(long)]
    quantity: u16,
    /// Read input registers instead of holding registers.
    #[arg(long)]
    input: bool,
    #[arg(long, value_enum, default_value_t = Format::U16)]
    format: Format,
    /// Word order for 32-bit formats: big or little.
    #[arg(long, default_value = "big", value_parser = parse_word_order)]
    word_order: WordOrder,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    let client = build_client(&args.conn)?;

    let values = if args.input {
        client
            .read_input_registers(args.slave, args.start, args.quantity)
            .await?
    } else {
        client
            .read_holding_registers(args.slave, args.start, args.quantity)
            .await?
    };

    match args.format {
        Format::U16 | Format::I16 => {
            for (idx, raw) in values.iter().enumerate() {
                let addr = args.start + idx as u16;
                match args.format {
                    Format::I16 => println!("addr={addr} value={}", to_signed16(*raw)),
                    _ => println!("addr={addr} value={raw} (0x{raw:04X})"),
                }
            }
        }
        Format::U32 | Format::I32 => {
            if values.len() % 2 != 0 {
                return Err("32-bit formats need an even register quantity".into());
            }
            for (idx, pair) in values.chunks_exact(2).enumerate() {
                let addr = args.start + (idx * 2) as u16;
                let raw = combine_u32(pair[0], pair[1], args.word_order);
                match args.format {
                    Format::I32 => println!("addr={addr} value={}", to_signed32(raw)),
                    _ => println!("addr={addr} value={raw} (0x{raw:08X})"),
                }
            }
        }
    }
    Ok(())
}
