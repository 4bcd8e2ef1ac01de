use std::{fs::File, path::PathBuf, time::Duration};

use anyhow::Context as _;
use aya::{
    maps::{MapData, PerCpuArray, RingBuf, SockHash},
    programs::{tc, CgroupAttachMode, SchedClassifier, SkMsg, SockOps, TcAttachType, UProbe},
    EbpfLoader,
};
use clap::Parser;
use kafkasnoop_common::SockKey;
use papaya_pktbuf::LoadTelemetry;
#[rustfmt::skip]
use log::{debug, info, warn};
use tokio::signal;

mod event;
mod ringbuf;
mod telemetry;

use event::{print_header, RequestPrinter};
use ringbuf::handle_ringbuf;
use telemetry::report_telemetry;

#[derive(Debug, Parser)]
struct Opt {
    #[clap(short, long, default_value = "eth0")]
    iface: String,

    #[clap(short, long, default_value = "false")]
    egress: bool,

    /// Kafka broker port
    #[clap(short, long, default_value_t = 9092)]
    port: u16,

    /// cgroup v2 directory to watch sockets in, enables the sk_msg source
    #[clap(long)]
    cgroup: Option<PathBuf>,

    /// libssl to attach SSL_read/SSL_write probes to, enables the tls source
    #[clap(long)]
    libssl: Option<PathBuf>,

    /// Only trace this process in the libssl probes
    #[clap(long)]
    pid: Option<i32>,

    /// Seconds between load telemetry reports, 0 to disable
    #[clap(long, default_value_t = 10)]
    telemetry_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();

    env_logger::init();

    // Bump the memlock rlimit. This is needed for older kernels that don't use the
    // new memcg based accounting, see https://lwn.net/Articles/837122/
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        debug!("remove limit on locked memory failed, ret is: {ret}");
    }

    let mut ebpf = EbpfLoader::new()
        .set_global("KAFKA_PORT", &opt.port, true)
        .load(aya::include_bytes_aligned!(concat!(
            env!("OUT_DIR"),
            "/kafkasnoop"
        )))
        .context("failed to load eBPF object")?;
    if let Err(e) = aya_log::EbpfLogger::init(&mut ebpf) {
        // This can happen if you remove all log statements from your eBPF program.
        warn!("failed to initialize eBPF logger: {e}");
    }

    let Opt {
        iface,
        egress,
        port,
        cgroup,
        libssl,
        pid,
        telemetry_interval,
    } = opt;
    println!("Interface: {iface}, egress: {egress}, port: {port}");

    // error adding clsact to the interface if it is already added is harmless
    // the full cleanup can be done with 'sudo tc qdisc del dev eth0 clsact'.
    let _ = tc::qdisc_add_clsact(&iface);
    let program: &mut SchedClassifier = ebpf
        .program_mut("kafkasnoop")
        .context("kafkasnoop program not found")?
        .try_into()?;
    program.load()?;

    let attach_type = if egress {
        TcAttachType::Egress
    } else {
        TcAttachType::Ingress
    };
    program
        .attach(&iface, attach_type)
        .with_context(|| format!("failed to attach classifier to {iface}"))?;

    // kept alive for the sk_msg attachment
    let mut _sockets = None;
    if let Some(cgroup) = cgroup {
        let sockets: SockHash<MapData, SockKey> = ebpf
            .take_map("SOCKETS")
            .context("SOCKETS map not found")?
            .try_into()?;

        let program: &mut SkMsg = ebpf
            .program_mut("kafkasnoop_msg")
            .context("kafkasnoop_msg program not found")?
            .try_into()?;
        program.load()?;
        program.attach(sockets.fd())?;

        let cgroup_file = File::open(&cgroup)
            .with_context(|| format!("failed to open cgroup {}", cgroup.display()))?;
        let program: &mut SockOps = ebpf
            .program_mut("kafkasnoop_sockops")
            .context("kafkasnoop_sockops program not found")?
            .try_into()?;
        program.load()?;
        program.attach(cgroup_file, CgroupAttachMode::default())?;

        info!("tracing sk_msg in cgroup {}", cgroup.display());
        _sockets = Some(sockets);
    }

    if let Some(libssl) = libssl {
        for (name, symbol) in [
            ("ssl_write", "SSL_write"),
            ("ssl_read", "SSL_read"),
            ("ssl_read_ret", "SSL_read"),
        ] {
            let program: &mut UProbe = ebpf
                .program_mut(name)
                .with_context(|| format!("{name} program not found"))?
                .try_into()?;
            program.load()?;
            program
                .attach(Some(symbol), 0, &libssl, pid)
                .with_context(|| format!("failed to attach {name} to {}", libssl.display()))?;
        }
        info!("tracing {}", libssl.display());
    }

    let events = RingBuf::try_from(ebpf.take_map("EVENTS").context("EVENTS map not found")?)?;
    tokio::spawn(async move {
        print_header();
        let mut printer = RequestPrinter::default();
        if let Err(e) = handle_ringbuf(events, &mut printer).await {
            warn!("stopped reading events: {e}");
        }
    });

    if telemetry_interval > 0 {
        let counters: PerCpuArray<MapData, LoadTelemetry> = ebpf
            .take_map("PKTBUF_TELEMETRY")
            .context("PKTBUF_TELEMETRY map not found")?
            .try_into()?;
        tokio::spawn(report_telemetry(
            counters,
            Duration::from_secs(telemetry_interval),
        ));
    }

    let ctrl_c = signal::ctrl_c();
    println!("Waiting for Ctrl-C...");
    ctrl_c.await?;
    println!("Exiting...");

    Ok(())
}
