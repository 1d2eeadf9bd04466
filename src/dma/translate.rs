//! CPU to DMA address translation

use crate::driver::error::{ConfigError, ConfigResult};

use super::packet::PktFlags;

/// Maps CPU buffer addresses to addresses the DMA engine can use.
///
/// Called for every buffer whose packet carries [`PktFlags::TR_DATA`] or
/// [`PktFlags::TR_HDR`] before the address is written to a descriptor.
pub trait AddressTranslate: Send + Sync {
    /// Translate a CPU address to a 32-bit bus address, or `None` if the
    /// DMA engine cannot reach it
    fn to_dma(&self, cpu_addr: usize) -> Option<u32>;
}

/// Flat memory: the bus sees CPU addresses unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslation;

impl AddressTranslate for IdentityTranslation {
    #[inline]
    fn to_dma(&self, cpu_addr: usize) -> Option<u32> {
        u32::try_from(cpu_addr).ok()
    }
}

/// Fixed offset between CPU and bus address spaces
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetTranslation {
    /// Value added to CPU addresses (wrapping)
    pub offset: u32,
}

impl AddressTranslate for OffsetTranslation {
    #[inline]
    fn to_dma(&self, cpu_addr: usize) -> Option<u32> {
        u32::try_from(cpu_addr)
            .ok()
            .map(|addr| addr.wrapping_add(self.offset))
    }
}

/// Whether `addr` can be translated when `flags` asks for it with `flag`
#[inline]
pub(crate) fn reachable(xlate: &dyn AddressTranslate, addr: usize, flags: PktFlags, flag: PktFlags) -> bool {
    !flags.contains(flag) || xlate.to_dma(addr).is_some()
}

/// Bus address for `addr`, translated if `flags` contains `flag`.
///
/// The flag is cleared when translation leaves the address unchanged.
/// Untranslated buffers are bus addresses already and only their low
/// 32 bits are programmed.
#[inline]
pub(crate) fn bus_addr(
    xlate: &dyn AddressTranslate,
    addr: usize,
    flags: &mut PktFlags,
    flag: PktFlags,
) -> ConfigResult<u32> {
    if !flags.contains(flag) {
        return Ok(addr as u32);
    }
    let dma = xlate.to_dma(addr).ok_or(ConfigError::InvalidArgument)?;
    if dma as usize == addr {
        flags.remove(flag);
    }
    Ok(dma)
}
