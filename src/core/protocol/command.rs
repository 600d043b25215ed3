// src/core/protocol/command.rs

//! The one thing a client ever sends over RESP: an array of bulk strings.

use bytes::{BufMut, Bytes, BytesMut};

/// A command ready to be written, name first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    parts: Vec<Bytes>,
}

impl Command {
    pub fn new<I, A>(name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        let mut parts = vec![Bytes::copy_from_slice(name.as_bytes())];
        parts.extend(args.into_iter().map(Into::into));
        Self { parts }
    }

    /// The command name, uppercased, for logging.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.parts[0]).to_ascii_uppercase()
    }

    /// Name and arguments, in wire order.
    pub fn parts(&self) -> &[Bytes] {
        &self.parts
    }

    /// Size of the encoded command, so a batch can be reserved up front.
    pub fn encoded_len(&self) -> usize {
        let header = 1 + decimal_len(self.parts.len()) + 2;
        self.parts
            .iter()
            .map(|p| 1 + decimal_len(p.len()) + 2 + p.len() + 2)
            .sum::<usize>()
            + header
    }

    /// Appends the RESP encoding to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u8(b'*');
        dst.put_slice(self.parts.len().to_string().as_bytes());
        dst.put_slice(b"\r\n");
        for part in &self.parts {
            dst.put_u8(b'$');
            dst.put_slice(part.len().to_string().as_bytes());
            dst.put_slice(b"\r\n");
            dst.put_slice(part);
            dst.put_slice(b"\r\n");
        }
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.write_to(&mut buf);
        buf.to_vec()
    }
}

fn decimal_len(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}
