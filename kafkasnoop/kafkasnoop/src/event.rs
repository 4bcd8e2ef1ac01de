use chrono::Local;
use kafkasnoop_common::KafkaRequest;
use log::debug;

use crate::ringbuf::RingBufEventHandler;

pub fn decode(data: &[u8]) -> Option<KafkaRequest> {
    if data.len() < KafkaRequest::LEN {
        return None;
    }
    // ring buffer records carry no alignment guarantee for us
    Some(unsafe { std::ptr::read_unaligned(data.as_ptr() as *const KafkaRequest) })
}

pub fn api_name(api_key: i16) -> &'static str {
    match api_key {
        0 => "Produce",
        1 => "Fetch",
        2 => "ListOffsets",
        3 => "Metadata",
        8 => "OffsetCommit",
        9 => "OffsetFetch",
        10 => "FindCoordinator",
        11 => "JoinGroup",
        12 => "Heartbeat",
        13 => "LeaveGroup",
        14 => "SyncGroup",
        15 => "DescribeGroups",
        16 => "ListGroups",
        17 => "SaslHandshake",
        18 => "ApiVersions",
        19 => "CreateTopics",
        20 => "DeleteTopics",
        22 => "InitProducerId",
        36 => "SaslAuthenticate",
        _ => "Unknown",
    }
}

pub fn print_header() {
    println!(
        "\n{:<12} {:<8} {:<8} {:<18} {:<4} {:<12} {:<32}",
        "TIME", "PID", "SOURCE", "API", "VER", "CORRELATION", "CLIENT ID"
    );
    println!("{:-<98}", "");
}

fn client_id(request: &KafkaRequest) -> String {
    if request.client_id_size < 0 {
        return "-".to_string();
    }
    let mut id = String::from_utf8_lossy(request.client_id()).into_owned();
    if request.client_id_truncated() {
        id.push_str("..");
    }
    id
}

/// One output line for `request`, without the timestamp column.
pub fn format_request(request: &KafkaRequest) -> String {
    let source = request.source().map(|s| s.name()).unwrap_or("?");
    let pid = match request.pid {
        0 => "-".to_string(),
        pid => pid.to_string(),
    };

    format!(
        "{:<8} {:<8} {:<18} {:<4} {:<12} {:<32}",
        pid,
        source,
        format!("{}({})", api_name(request.api_key), request.api_key),
        request.api_version,
        request.correlation_id,
        client_id(request)
    )
}

#[derive(Default)]
pub struct RequestPrinter {
    pub printed: u64,
}

impl RingBufEventHandler for RequestPrinter {
    fn handle_event(&mut self, data: &[u8]) {
        let Some(request) = decode(data) else {
            debug!("dropping short ring buffer record of {} bytes", data.len());
            return;
        };

        println!(
            "{:<12} {}",
            Local::now().format("%H:%M:%S"),
            format_request(&request)
        );
        self.printed += 1;
    }
}

#[cfg(test)]
mod tests {
    use kafkasnoop_common::CLIENT_ID_SIZE;
    use papaya_pktbuf::Source;

    use super::*;

    fn request(client_id: &[u8], client_id_size: i16) -> KafkaRequest {
        let mut request = KafkaRequest::empty();
        request.pid = 4242;
        request.api_key = 1;
        request.api_version = 12;
        request.correlation_id = 99;
        request.source = Source::Tls as u8;
        request.client_id_size = client_id_size;
        request.client_id_len = client_id.len() as u16;
        request.client_id[..client_id.len()].copy_from_slice(client_id);
        request
    }

    fn as_bytes(request: &KafkaRequest) -> Vec<u8> {
        let ptr = request as *const KafkaRequest as *const u8;
        unsafe { std::slice::from_raw_parts(ptr, KafkaRequest::LEN) }.to_vec()
    }

    #[test]
    fn decodes_records() {
        let expected = request(b"rdkafka", 7);
        let decoded = decode(&as_bytes(&expected)).unwrap();
        assert_eq!(decoded.correlation_id, 99);
        assert_eq!(decoded.client_id(), b"rdkafka");
        assert_eq!(decoded.source(), Some(Source::Tls));

        let bytes = as_bytes(&expected);
        assert!(decode(&bytes[..KafkaRequest::LEN - 1]).is_none());
    }

    #[test]
    fn formats_request_line() {
        let line = format_request(&request(b"rdkafka", 7));
        let columns: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(columns, ["4242", "tls", "Fetch(1)", "12", "99", "rdkafka"]);
    }

    #[test]
    fn marks_truncated_and_null_client_ids() {
        let long = [b'p'; CLIENT_ID_SIZE];
        let line = format_request(&request(&long, 64));
        assert!(line.trim_end().ends_with("pp.."));

        let line = format_request(&request(b"", -1));
        assert_eq!(line.split_whitespace().last(), Some("-"));
    }

    #[test]
    fn printer_skips_short_records() {
        let mut printer = RequestPrinter::default();
        printer.handle_event(&[0u8; 3]);
        assert_eq!(printer.printed, 0);

        printer.handle_event(&as_bytes(&request(b"c", 1)));
        assert_eq!(printer.printed, 1);
    }

    #[test]
    fn unknown_api_keys() {
        assert_eq!(api_name(0), "Produce");
        assert_eq!(api_name(18), "ApiVersions");
        assert_eq!(api_name(999), "Unknown");
    }
}
