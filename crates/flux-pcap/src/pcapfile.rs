use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use crate::timestamp::PacketTimestamp;

const MAGIC_NUMBER: u32 = 0xa1b2_c3d4;
const VERSION_MAJOR: u16 = 2;
const VERSION_MINOR: u16 = 4;

/// Writes the classic (non-pcapng) libpcap file format: a 24-byte global
/// header followed by one 16-byte per-packet header plus payload per
/// packet. Written native-endian, as libpcap itself does — the magic
/// number is how readers detect byte order.
pub struct PcapWriter {
    out: BufWriter<File>,
    packet_count: u32,
}

impl PcapWriter {
    pub fn create(path: &Path, datalink_type: u32, snaplen: u32) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);

        out.write_all(&MAGIC_NUMBER.to_ne_bytes())?;
        out.write_all(&VERSION_MAJOR.to_ne_bytes())?;
        out.write_all(&VERSION_MINOR.to_ne_bytes())?;
        out.write_all(&0i32.to_ne_bytes())?; // thiszone
        out.write_all(&0u32.to_ne_bytes())?; // sigfigs
        out.write_all(&snaplen.to_ne_bytes())?;
        out.write_all(&datalink_type.to_ne_bytes())?;

        Ok(Self { out, packet_count: 0 })
    }

    pub fn write_packet(&mut self, ts: PacketTimestamp, caplen: u32, wirelen: u32, data: &[u8]) -> io::Result<()> {
        self.out.write_all(&ts.secs.to_ne_bytes())?;
        self.out.write_all(&ts.micros.to_ne_bytes())?;
        self.out.write_all(&caplen.to_ne_bytes())?;
        self.out.write_all(&wirelen.to_ne_bytes())?;
        self.out.write_all(data)?;
        self.packet_count += 1;
        Ok(())
    }

    pub fn packet_count(&self) -> u32 {
        self.packet_count
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.out.flush()
    }
}
