use crate::{ByteReader, ByteWriter, SerdeErr};

/// A type that can be written to and read from a byte stream
pub trait Serde: Sized {
    /// Writes the value into the given writer
    fn ser(&self, writer: &mut ByteWriter);

    /// Parses a value out of the given reader
    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr>;

    /// Number of bytes `ser` will produce for this value
    fn byte_length(&self) -> usize;
}

/// A type whose encoding always occupies the same number of bytes
pub trait ConstByteLength {
    fn const_byte_length() -> usize;
}
