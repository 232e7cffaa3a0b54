use std::fmt;
use std::ops::BitOr;

use goridge_frame::{flags, CODEC_JSON, CODEC_MSGPACK, CODEC_RAW};
use serde::de::value::BytesDeserializer;
use serde::de::DeserializeOwned;
use serde::ser::{Impossible, Serialize, Serializer};

use crate::error::CodecError;

/// Flags passed to [`Codec::decode`], OR'd into the codec's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DecodeOptions(u32);

impl DecodeOptions {
    /// No extra flags.
    pub const NONE: DecodeOptions = DecodeOptions(0);

    /// JSON: decode an empty body as `null` instead of failing.
    pub const EMPTY_AS_NULL: DecodeOptions = DecodeOptions(1);

    pub const fn from_bits(bits: u32) -> Self {
        DecodeOptions(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: DecodeOptions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DecodeOptions {
    type Output = DecodeOptions;

    fn bitor(self, rhs: Self) -> Self::Output {
        DecodeOptions(self.0 | rhs.0)
    }
}

/// Payload serialization carried inside a frame.
///
/// The codec id travels in the low bits of the frame flags so the worker
/// knows how to read the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Opaque bytes. Only byte strings and strings can be sent.
    Raw,
    #[default]
    Json,
    /// MessagePack with named struct fields.
    MsgPack,
}

impl Codec {
    /// Numeric id written into the frame flags.
    pub fn id(self) -> u8 {
        match self {
            Codec::Raw => CODEC_RAW,
            Codec::Json => CODEC_JSON,
            Codec::MsgPack => CODEC_MSGPACK,
        }
    }

    /// Codec for a flag-encoded id, if it is one we speak.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            CODEC_RAW => Some(Codec::Raw),
            CODEC_JSON => Some(Codec::Json),
            CODEC_MSGPACK => Some(Codec::MsgPack),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        flags::codec_name(self.id())
    }

    /// Flags this codec always decodes with.
    fn default_options(self) -> DecodeOptions {
        DecodeOptions::NONE
    }

    /// Serialize `value` into payload bytes.
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self {
            Codec::Raw => value.serialize(RawSerializer),
            Codec::Json => serde_json::to_vec(value).map_err(CodecError::JsonEncode),
            Codec::MsgPack => Ok(rmp_serde::to_vec_named(value)?),
        }
    }

    /// Deserialize payload bytes.
    ///
    /// Raw payloads decode into byte containers such as `bytes::Bytes`, or
    /// into `String` when they are valid UTF-8.
    pub fn decode<T: DeserializeOwned>(
        self,
        bytes: &[u8],
        options: DecodeOptions,
    ) -> Result<T, CodecError> {
        let options = self.default_options() | options;
        match self {
            Codec::Raw => T::deserialize(BytesDeserializer::<CodecError>::new(bytes)),
            Codec::Json => {
                let bytes = if bytes.is_empty() && options.contains(DecodeOptions::EMPTY_AS_NULL) {
                    &b"null"[..]
                } else {
                    bytes
                };
                serde_json::from_slice(bytes).map_err(CodecError::JsonDecode)
            }
            Codec::MsgPack => Ok(rmp_serde::from_slice(bytes)?),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Serializer for the raw codec: passes byte strings and strings through
/// and rejects everything else.
struct RawSerializer;

fn raw_unsupported<T>(kind: &str) -> Result<T, CodecError> {
    Err(CodecError::Raw(format!(
        "cannot send {kind}, expected a byte string"
    )))
}

macro_rules! reject_scalars {
    ($($method:ident($ty:ty) => $kind:literal),* $(,)?) => {
        $(
            fn $method(self, _v: $ty) -> Result<Self::Ok, Self::Error> {
                raw_unsupported($kind)
            }
        )*
    };
}

impl Serializer for RawSerializer {
    type Ok = Vec<u8>;
    type Error = CodecError;
    type SerializeSeq = Impossible<Vec<u8>, CodecError>;
    type SerializeTuple = Impossible<Vec<u8>, CodecError>;
    type SerializeTupleStruct = Impossible<Vec<u8>, CodecError>;
    type SerializeTupleVariant = Impossible<Vec<u8>, CodecError>;
    type SerializeMap = Impossible<Vec<u8>, CodecError>;
    type SerializeStruct = Impossible<Vec<u8>, CodecError>;
    type SerializeStructVariant = Impossible<Vec<u8>, CodecError>;

    fn serialize_bytes(self, v: &[u8]) -> Result<Self::Ok, Self::Error> {
        Ok(v.to_vec())
    }

    fn serialize_str(self, v: &str) -> Result<Self::Ok, Self::Error> {
        Ok(v.as_bytes().to_vec())
    }

    reject_scalars! {
        serialize_bool(bool) => "a boolean",
        serialize_i8(i8) => "an integer",
        serialize_i16(i16) => "an integer",
        serialize_i32(i32) => "an integer",
        serialize_i64(i64) => "an integer",
        serialize_u8(u8) => "an integer",
        serialize_u16(u16) => "an integer",
        serialize_u32(u32) => "an integer",
        serialize_u64(u64) => "an integer",
        serialize_f32(f32) => "a float",
        serialize_f64(f64) => "a float",
        serialize_char(char) => "a char",
    }

    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        raw_unsupported("null")
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        raw_unsupported("unit")
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Self::Ok, Self::Error> {
        raw_unsupported("a unit struct")
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<Self::Ok, Self::Error> {
        raw_unsupported("an enum")
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        raw_unsupported("an enum")
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        raw_unsupported("a sequence")
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        raw_unsupported("a tuple")
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        raw_unsupported("a tuple struct")
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        raw_unsupported("an enum")
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        raw_unsupported("a map")
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        raw_unsupported("a struct")
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        raw_unsupported("an enum")
    }
}
