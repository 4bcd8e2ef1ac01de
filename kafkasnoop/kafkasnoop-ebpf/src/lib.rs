#![no_std]

use aya_ebpf::{
    cty::c_long,
    macros::map,
    maps::{LruHashMap, RingBuf, SockHash},
    programs::TcContext,
    EbpfContext,
};
use aya_log_ebpf::debug;
use kafkasnoop_common::{parse_request, KafkaRequest, SockKey};
use network_types::{
    eth::{EthHdr, EtherType},
    ip::{IpProto, Ipv4Hdr, Ipv6Hdr},
};
use papaya_pktbuf::{kernel::KernelPktBuf, SkbInfo};

// offset of the data offset nibble in a TCP header
const TCP_DOFF_OFFSET: usize = 12;

/// Broker port, patched by user space at load time.
#[no_mangle]
static KAFKA_PORT: u16 = 9092;

#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(256 * 1024, 0);

/// `SSL_read` buffer pointers keyed by pid_tgid, between entry and return.
/// Entries whose return probe never fired get evicted.
#[map]
pub static SSL_READ_ARGS: LruHashMap<u64, u64> = LruHashMap::with_max_entries(1024, 0);

/// Established Kafka sockets; the sk_msg program is attached to this map.
#[map]
pub static SOCKETS: SockHash<SockKey> = SockHash::with_max_entries(8192, 0);

#[inline(always)]
pub fn kafka_port() -> u16 {
    unsafe { core::ptr::read_volatile(&KAFKA_PORT) }
}

/// Window over the TCP payload if this frame is Kafka traffic.
#[inline(always)]
pub fn kafka_payload(ctx: &TcContext) -> Result<Option<SkbInfo>, c_long> {
    let ethhdr: EthHdr = ctx.load(0)?;

    let tcp_offset = match ethhdr.ether_type {
        EtherType::Ipv4 => {
            let header = ctx.load::<Ipv4Hdr>(EthHdr::LEN)?;
            match header.proto {
                IpProto::Tcp => {}
                _ => return Ok(None),
            }
            // network-types assumes no options; take the real header length
            let vihl: u8 = ctx.load(EthHdr::LEN)?;
            EthHdr::LEN + (vihl & 0x0f) as usize * 4
        }
        EtherType::Ipv6 => {
            let header = ctx.load::<Ipv6Hdr>(EthHdr::LEN)?;
            match header.next_hdr {
                IpProto::Tcp => {}
                _ => return Ok(None),
            }
            EthHdr::LEN + Ipv6Hdr::LEN
        }
        _ => return Ok(None),
    };

    let ports: [u8; 4] = ctx.load(tcp_offset)?;
    let src_port = u16::from_be_bytes([ports[0], ports[1]]);
    let dst_port = u16::from_be_bytes([ports[2], ports[3]]);
    let port = kafka_port();
    if src_port != port && dst_port != port {
        return Ok(None);
    }

    let doff: u8 = ctx.load(tcp_offset + TCP_DOFF_OFFSET)?;
    let payload_offset = tcp_offset + (doff >> 4) as usize * 4;

    Ok(Some(SkbInfo::new(payload_offset as u32, ctx.len())))
}

/// Dissects a request header out of `pkt` and sends it to user space.
#[inline(always)]
pub fn emit_request<C: EbpfContext>(ctx: &C, pkt: &KernelPktBuf<'_>, pid: u32) -> bool {
    let Some(mut entry) = EVENTS.reserve::<KafkaRequest>(0) else {
        return false;
    };

    let request = unsafe { entry.assume_init_mut() };
    if parse_request(pkt, request).is_none() {
        // usage of RingBufEntry requires us to submit or discard after reserving
        entry.discard(0);
        return false;
    }
    request.pid = pid;

    debug!(
        ctx,
        "kafka request key {} version {} correlation {}",
        request.api_key,
        request.api_version,
        request.correlation_id
    );

    entry.submit(0);
    true
}
