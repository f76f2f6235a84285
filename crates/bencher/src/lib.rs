//! Request samples shared by the benchmarks.

/// Size class of a sample, used to group benchmark results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleSize {
    Small,
    Large,
}

/// A raw request as captured from a connection.
#[derive(Clone, Debug)]
pub struct RequestSample {
    name: &'static str,
    size: SampleSize,
    raw: Vec<u8>,
}

impl RequestSample {
    pub fn new(name: &'static str, size: SampleSize, raw: impl Into<Vec<u8>>) -> Self {
        Self { name, size, raw: raw.into() }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn size(&self) -> SampleSize {
        self.size
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// A liveness probe as sent by load balancers.
pub fn ping() -> RequestSample {
    RequestSample::new("ping", SampleSize::Small, &b"GET /ping HTTP/1.1\r\nHost: node\r\n\r\n"[..])
}

/// An artifact download with the headers a browser and a CDN front add.
pub fn artifact_download() -> RequestSample {
    let mut raw = String::from("GET /artifacts/9f2c1e/dist/bundle.tar.gz?token=abc123&range=full HTTP/1.1\r\n");
    for (name, value) in [
        ("Host", "edge-17.node.example"),
        ("User-Agent", "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36"),
        ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"),
        ("Accept-Encoding", "gzip, deflate, br, zstd"),
        ("Accept-Language", "en-US,en;q=0.9,de;q=0.8"),
        ("Cache-Control", "no-cache"),
        ("Connection", "keep-alive"),
        ("If-None-Match", "\"5f8d-1a2b3c4d5e6f\""),
        ("X-Forwarded-For", "203.0.113.7, 198.51.100.23"),
        ("X-Request-Id", "0b6f5e8a-3c1d-4e2f-9a7b-8c6d5e4f3a2b"),
    ] {
        raw.push_str(name);
        raw.push_str(": ");
        raw.push_str(value);
        raw.push_str("\r\n");
    }
    raw.push_str("Cookie: ");
    raw.push_str(&"session=8f14e45fceea167a5a36dedd4bea2543; ".repeat(24));
    raw.push_str("\r\n\r\n");
    RequestSample::new("artifact_download", SampleSize::Large, raw)
}

/// A small report upload with a body.
pub fn report_upload() -> RequestSample {
    let body = r#"{"node":"edge-17","hits":4711,"misses":42,"bytes_sent":1073741824}"#;
    let raw = format!(
        "POST /api/report HTTP/1.1\r\nHost: coordinator\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    RequestSample::new("report_upload", SampleSize::Small, raw)
}

pub fn samples() -> Vec<RequestSample> {
    vec![ping(), artifact_download(), report_upload()]
}
