use core::cmp;

use papaya_pktbuf::{Platform, PktBuf};

use crate::{KafkaRequest, CLIENT_ID_BLOCK, CLIENT_ID_SIZE};

/// Length of the fixed part of a request header, size prefix included.
pub const MIN_HEADER_LEN: u32 = 14;

/// Decodes the request header at the start of the packet window into
/// `request`.
///
/// Returns the offset of the request body, or `None` when the window doesn't
/// hold a plausible header. `request` is only written on success.
#[inline(always)]
pub fn parse_request<P: Platform>(pkt: &PktBuf<'_, P>, request: &mut KafkaRequest) -> Option<u32> {
    let mut offset = pkt.data_offset();

    let message_size: i32 = pkt.read_big_endian_advance(&mut offset)?;
    let api_key: i16 = pkt.read_big_endian_advance(&mut offset)?;
    let api_version: i16 = pkt.read_big_endian_advance(&mut offset)?;
    let correlation_id: i32 = pkt.read_big_endian_advance(&mut offset)?;
    let client_id_size: i16 = pkt.read_big_endian_advance(&mut offset)?;

    // the size prefix doesn't count itself
    if message_size < (MIN_HEADER_LEN - 4) as i32 {
        return None;
    }
    if api_key < 0 || api_version < 0 || correlation_id < 0 || client_id_size < -1 {
        return None;
    }

    let mut client_id_len = 0;
    if client_id_size > 0 {
        let copied = pkt.read_into_buffer::<CLIENT_ID_SIZE, CLIENT_ID_BLOCK>(
            offset,
            &mut request.client_id,
        );
        client_id_len = cmp::min(copied, client_id_size as usize);
        offset = offset.checked_add(client_id_size as u32)?;
    }

    request.message_size = message_size;
    request.api_key = api_key;
    request.api_version = api_version;
    request.correlation_id = correlation_id;
    request.client_id_size = client_id_size;
    request.client_id_len = client_id_len as u16;
    request.source = pkt.source() as u8;

    Some(offset)
}
