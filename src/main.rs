use std::net::Ipv4Addr;

use log::{error, info};
use structopt::StructOpt;

use captive_dns::{Config, DnsServer, Hostname, OpcodeFilter, Responder, DNS_PORT};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "captive-dns",
    about = "Answer DNS A questions with the address of this host"
)]
struct Opt {
    /// IPv4 address of the interface to listen on, also used in answers
    #[structopt(short, long)]
    address: Ipv4Addr,

    /// UDP port to listen on [default: 53]
    #[structopt(short, long)]
    port: Option<u16>,

    /// Only answer questions for this name
    #[structopt(short = "n", long)]
    hostname: Option<Hostname>,

    /// Answer every question, whatever the name
    #[structopt(short = "A", long)]
    answer_all: bool,

    /// Address to answer with when it differs from the listening address
    #[structopt(long)]
    answer_address: Option<Ipv4Addr>,

    /// Reply NOTIMP to anything but standard queries
    #[structopt(long)]
    reject_nonstandard_opcodes: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opt = Opt::from_args();
    info!("Starting DNS Server: {:?}", opt);

    let opcode_filter = if opt.reject_nonstandard_opcodes {
        OpcodeFilter::StandardOnly
    } else {
        OpcodeFilter::Legacy
    };

    let config = Config::builder()
        .hostname(opt.hostname)
        .answer_all(opt.answer_all)
        .opcode_filter(opcode_filter)
        .answer_addr(opt.answer_address.unwrap_or(opt.address))
        .build();
    let responder = Responder::new(config)?;

    let server = match DnsServer::bind((opt.address, opt.port.unwrap_or(DNS_PORT)), responder) {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    server.run();

    Ok(())
}
