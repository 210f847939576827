use crate::{ByteReader, ByteWriter, ConstByteLength, Serde, SerdeErr};

macro_rules! impl_fixed_width {
    ($type:ty, $size:expr) => {
        impl Serde for $type {
            fn ser(&self, writer: &mut ByteWriter) {
                writer.write_bytes(&self.to_le_bytes());
            }

            fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
                let bytes = reader.read_bytes($size)?;
                let mut array = [0u8; $size];
                array.copy_from_slice(bytes);
                Ok(<$type>::from_le_bytes(array))
            }

            fn byte_length(&self) -> usize {
                $size
            }
        }

        impl ConstByteLength for $type {
            fn const_byte_length() -> usize {
                $size
            }
        }
    };
}

impl_fixed_width!(u8, 1);
impl_fixed_width!(u16, 2);
impl_fixed_width!(u32, 4);
impl_fixed_width!(u64, 8);
impl_fixed_width!(i8, 1);
impl_fixed_width!(i16, 2);
impl_fixed_width!(i32, 4);
impl_fixed_width!(i64, 8);
impl_fixed_width!(f32, 4);
impl_fixed_width!(f64, 8);

impl Serde for bool {
    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_bool(*self);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        reader.read_bool()
    }

    fn byte_length(&self) -> usize {
        1
    }
}

impl ConstByteLength for bool {
    fn const_byte_length() -> usize {
        1
    }
}

impl Serde for () {
    fn ser(&self, _: &mut ByteWriter) {}

    fn de(_: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(())
    }

    fn byte_length(&self) -> usize {
        0
    }
}

impl<T: Serde> Serde for Option<T> {
    fn ser(&self, writer: &mut ByteWriter) {
        match self {
            Some(value) => {
                writer.write_bool(true);
                value.ser(writer);
            }
            None => writer.write_bool(false),
        }
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        if reader.read_bool()? {
            Ok(Some(T::de(reader)?))
        } else {
            Ok(None)
        }
    }

    fn byte_length(&self) -> usize {
        1 + self.as_ref().map_or(0, Serde::byte_length)
    }
}

impl<T: Serde, const N: usize> Serde for [T; N] {
    fn ser(&self, writer: &mut ByteWriter) {
        for item in self {
            item.ser(writer);
        }
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::de(reader)?);
        }
        items.try_into().map_err(|_| SerdeErr::InvalidValue {
            type_name: "array",
            detail: format!("expected {} elements", N),
        })
    }

    fn byte_length(&self) -> usize {
        self.iter().map(Serde::byte_length).sum()
    }
}

impl<T: ConstByteLength, const N: usize> ConstByteLength for [T; N] {
    fn const_byte_length() -> usize {
        T::const_byte_length() * N
    }
}

// Collections carry a u16 element count

fn read_count(reader: &mut ByteReader, type_name: &'static str) -> Result<usize, SerdeErr> {
    let count = reader.read_u16()? as usize;
    if count > reader.remaining() {
        return Err(SerdeErr::InvalidValue {
            type_name,
            detail: format!("declared {} elements with {} bytes left", count, reader.remaining()),
        });
    }
    Ok(count)
}

impl Serde for String {
    fn ser(&self, writer: &mut ByteWriter) {
        let bytes = self.as_bytes();
        let length = bytes.len().min(u16::MAX as usize);
        writer.write_u16(length as u16);
        writer.write_bytes(&bytes[..length]);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let count = read_count(reader, "String")?;
        let bytes = reader.read_bytes(count)?;
        String::from_utf8(bytes.to_vec()).map_err(|error| SerdeErr::InvalidValue {
            type_name: "String",
            detail: error.to_string(),
        })
    }

    fn byte_length(&self) -> usize {
        2 + self.len().min(u16::MAX as usize)
    }
}

impl<T: Serde> Serde for Vec<T> {
    fn ser(&self, writer: &mut ByteWriter) {
        let length = self.len().min(u16::MAX as usize);
        writer.write_u16(length as u16);
        for item in self.iter().take(length) {
            item.ser(writer);
        }
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let count = read_count(reader, "Vec")?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(T::de(reader)?);
        }
        Ok(items)
    }

    fn byte_length(&self) -> usize {
        2 + self
            .iter()
            .take(u16::MAX as usize)
            .map(Serde::byte_length)
            .sum::<usize>()
    }
}
