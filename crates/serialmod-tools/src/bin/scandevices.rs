use clap::Parser;
use serialmod_client::RequestOptions;
use serialmod_core::pdu::FunctionCode;
use serialmod_tools::common::{SerialConnectionArgs, build_client, init_tracing};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "scandevices", about = "Scan slave addresses on a serial line")]
struct Args {
    #[command(flatten)]
    conn: SerialConnectionArgs,
    #[arg(long, default_value_t = 1)]
    slave_start: u8,
    #[arg(long, default_value_t = 247)]
    slave_end: u8,
    #[arg(long, default_value_t = 0)]
    probe_start: u16,
    /// Per-address timeout in milliseconds; absent devices cost this much each.
    #[arg(long, default_value_t = 200)]
    probe_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    if args.slave_start == 0 || args.slave_start > args.slave_end || args.slave_end > 247 {
        return Err("invalid slave address range".into());
    }

    let client = build_client(&args.conn)?;
    let options = RequestOptions::default()
        .with_timeout(Duration::from_millis(args.probe_timeout))
        .with_max_retries(1);
    let probe = args.probe_start.to_be_bytes();
    let payload = [probe[0], probe[1], 0x00, 0x01];
    let mut found = Vec::new();

    for slave in args.slave_start..=args.slave_end {
        let result = client
            .request(slave, FunctionCode::ReadHoldingRegisters, &payload, options)
            .await;

        // An exception still proves a device is listening at this address.
        let responded = match &result {
            Ok(_) => true,
            Err(err) => err.exception().is_some(),
        };
        if responded {
            println!("slave {} responded", slave);
            found.push(slave);
        }
    }

    if found.is_empty() {
        println!("no responding slaves found");
    } else {
        println!("found {} slave(s): {:?}", found.len(), found);
    }

    Ok(())
}
