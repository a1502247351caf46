use clap::Parser;
use serialmod_datalink::available_ports;
use serialmod_tools::common::init_tracing;

#[derive(Debug, Parser)]
#[command(name = "listports", about = "List serial ports reported by the OS")]
struct Args {}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let _args = Args::parse();

    let ports = available_ports()?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}
