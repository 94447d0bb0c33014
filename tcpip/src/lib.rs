pub mod icmp;
pub mod ipv4;

pub trait TryFromBytes {
    type Error;

    fn try_from_bytes(value: impl AsRef<[u8]>) -> Result<Self, Self::Error>
    where
        Self: Sized;
}
