//! Sends two hard-coded samples to a Zabbix server and prints the answer.
//!
//! Handy for checking that a trapper is reachable before wiring up the
//! webhook bridge.

use anyhow::Result;
use clap::Parser;
use zabbix_webhook::{
    core::{Batch, MetricSample, MetricSink},
    zabbix::ZabbixSender,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Zabbix server or proxy address.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Zabbix trapper port.
    #[arg(long, default_value_t = 10051)]
    port: u16,

    /// Host name the samples are reported under.
    #[arg(long, default_value = "test")]
    zabbix_host: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let samples = vec![
        MetricSample::new(&args.zabbix_host, "cpu", "100.25")
            .with_timestamp(chrono::Utc::now().timestamp()),
        MetricSample::new(&args.zabbix_host, "status", "OK"),
    ];
    let batch = Batch::new(samples).ok_or_else(|| anyhow::anyhow!("nothing to send"))?;

    let sender = ZabbixSender::new(args.host, args.port);
    let response = sender.send(&batch).await?;
    println!(
        "sent to {}: processed {}, failed {}, total {}",
        sender.address(),
        response.processed,
        response.failed,
        response.total
    );
    Ok(())
}
