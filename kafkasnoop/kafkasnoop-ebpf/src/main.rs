#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::{
        sk_action, BPF_NOEXIST, BPF_SOCK_OPS_ACTIVE_ESTABLISHED_CB,
        BPF_SOCK_OPS_PASSIVE_ESTABLISHED_CB, TC_ACT_PIPE,
    },
    cty::c_long,
    helpers::bpf_get_current_pid_tgid,
    macros::{classifier, sk_msg, sock_ops, uprobe, uretprobe},
    programs::{ProbeContext, RetProbeContext, SkMsgContext, SockOpsContext, TcContext},
};
use aya_log_ebpf::info;
use kafkasnoop_common::SockKey;
use kafkasnoop_ebpf::{emit_request, kafka_payload, kafka_port, SOCKETS, SSL_READ_ARGS};
use papaya_pktbuf::{kernel::KernelPktBuf, TlsStream};

#[classifier]
pub fn kafkasnoop(ctx: TcContext) -> i32 {
    match try_kafkasnoop(&ctx) {
        Ok(ret) => ret,
        Err(_) => TC_ACT_PIPE,
    }
}

fn try_kafkasnoop(ctx: &TcContext) -> Result<i32, c_long> {
    let Some(info) = kafka_payload(ctx)? else {
        return Ok(TC_ACT_PIPE);
    };

    // no process context in TC
    let pkt = KernelPktBuf::from_skb(ctx, Some(&info));
    emit_request(ctx, &pkt, 0);

    Ok(TC_ACT_PIPE)
}

#[sock_ops]
pub fn kafkasnoop_sockops(ctx: SockOpsContext) -> u32 {
    match try_kafkasnoop_sockops(&ctx) {
        Ok(ret) => ret,
        Err(_) => 0,
    }
}

fn try_kafkasnoop_sockops(ctx: &SockOpsContext) -> Result<u32, c_long> {
    match ctx.op() {
        BPF_SOCK_OPS_ACTIVE_ESTABLISHED_CB | BPF_SOCK_OPS_PASSIVE_ESTABLISHED_CB => {}
        _ => return Ok(0),
    }

    let local_port = ctx.local_port();
    let remote_port = remote_port(ctx.remote_port());
    let port = kafka_port() as u32;
    if local_port != port && remote_port != port {
        return Ok(0);
    }

    let mut key = SockKey {
        local_ip4: ctx.local_ip4(),
        remote_ip4: ctx.remote_ip4(),
        local_port,
        remote_port,
    };
    SOCKETS.update(&mut key, unsafe { &mut *ctx.ops }, BPF_NOEXIST.into())?;

    info!(ctx, "tracking kafka socket {} -> {}", local_port, remote_port);
    Ok(0)
}

// remote_port is in network byte order; older kernels also shift it into
// the upper half of the word
#[inline(always)]
fn remote_port(raw: u32) -> u32 {
    let port = if raw > 0xffff { raw >> 16 } else { raw };
    u16::from_be(port as u16) as u32
}

#[sk_msg]
pub fn kafkasnoop_msg(ctx: SkMsgContext) -> u32 {
    let pid = (bpf_get_current_pid_tgid() >> 32) as u32;

    let pkt = KernelPktBuf::from_sk_msg(&ctx);
    emit_request(&ctx, &pkt, pid);

    sk_action::SK_PASS
}

// int SSL_write(SSL *ssl, const void *buf, int num)
#[uprobe]
pub fn ssl_write(ctx: ProbeContext) -> u32 {
    let _ = try_ssl_write(&ctx);
    0
}

fn try_ssl_write(ctx: &ProbeContext) -> Result<(), c_long> {
    let buffer: u64 = ctx.arg(1).ok_or(-1)?;
    let len: i32 = ctx.arg(2).ok_or(-1)?;
    if len <= 0 {
        return Ok(());
    }

    let stream = TlsStream {
        buffer_ptr: buffer,
        data_off: 0,
        data_end: len as u32,
    };
    let pkt = KernelPktBuf::from_tls(&stream);
    emit_request(ctx, &pkt, (bpf_get_current_pid_tgid() >> 32) as u32);

    Ok(())
}

// int SSL_read(SSL *ssl, void *buf, int num)
#[uprobe]
pub fn ssl_read(ctx: ProbeContext) -> u32 {
    let _ = try_ssl_read(&ctx);
    0
}

fn try_ssl_read(ctx: &ProbeContext) -> Result<(), c_long> {
    let buffer: u64 = ctx.arg(1).ok_or(-1)?;
    SSL_READ_ARGS.insert(&bpf_get_current_pid_tgid(), &buffer, 0)
}

#[uretprobe]
pub fn ssl_read_ret(ctx: RetProbeContext) -> u32 {
    let _ = try_ssl_read_ret(&ctx);
    0
}

fn try_ssl_read_ret(ctx: &RetProbeContext) -> Result<(), c_long> {
    let id = bpf_get_current_pid_tgid();
    let Some(buffer) = (unsafe { SSL_READ_ARGS.get(&id) }).copied() else {
        return Ok(());
    };
    SSL_READ_ARGS.remove(&id)?;

    // plaintext lands in [0, ret) of the caller's buffer
    let read: i32 = ctx.ret().ok_or(-1)?;
    if read <= 0 {
        return Ok(());
    }

    let stream = TlsStream {
        buffer_ptr: buffer,
        data_off: 0,
        data_end: read as u32,
    };
    let pkt = KernelPktBuf::from_tls(&stream);
    emit_request(ctx, &pkt, (id >> 32) as u32);

    Ok(())
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";
