use std::io::{self, Read};
use std::path::Path;

/// Bytes inspected at the start of a fragment.
pub const HEADER_LEN: usize = 12;

const MP4_MARKERS: [&[u8]; 2] = [b"ftyp", b"moov"];
const TS_SYNC_BYTE: u8 = 0x47;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Mp4,
    MpegTs,
    Unknown,
}

/// Classifies a header by looking for container signatures in it.
pub fn classify(header: &[u8]) -> ContainerKind {
    let header = &header[..header.len().min(HEADER_LEN)];

    if MP4_MARKERS
        .iter()
        .any(|marker| header.windows(marker.len()).any(|window| window == *marker))
    {
        ContainerKind::Mp4
    } else if header.first() == Some(&TS_SYNC_BYTE) {
        ContainerKind::MpegTs
    } else {
        ContainerKind::Unknown
    }
}

pub fn sniff_file(path: &Path) -> io::Result<ContainerKind> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    std::fs::File::open(path)?.take(HEADER_LEN as u64).read_to_end(&mut header)?;
    Ok(classify(&header))
}
