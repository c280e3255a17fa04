//! Choice of the usage sampler, made once at startup.
use std::sync::Arc;

use crate::core::traits::sampler::UsageSampler;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SamplerChoice {
    /// Portable probe when compiled in, otherwise the native one.
    #[default]
    Auto,
    Portable,
    Procfs,
    Win32,
}

#[derive(Debug, thiserror::Error)]
#[error("the {0} sampler is not available in this build")]
pub struct UnavailableSampler(&'static str);

pub fn select(choice: SamplerChoice) -> Result<Arc<dyn UsageSampler>, UnavailableSampler> {
    let sampler = match choice {
        SamplerChoice::Auto => portable().or_else(|_| native())?,
        SamplerChoice::Portable => portable()?,
        SamplerChoice::Procfs => procfs()?,
        SamplerChoice::Win32 => win32()?,
    };
    tracing::info!("Using the {} usage sampler", sampler.name());
    Ok(sampler)
}

fn native() -> Result<Arc<dyn UsageSampler>, UnavailableSampler> {
    if cfg!(windows) { win32() } else { procfs() }
}

fn portable() -> Result<Arc<dyn UsageSampler>, UnavailableSampler> {
    #[cfg(feature = "portable")]
    {
        Ok(Arc::new(crate::portable::PortableSampler::new()))
    }
    #[cfg(not(feature = "portable"))]
    {
        Err(UnavailableSampler("portable"))
    }
}

fn procfs() -> Result<Arc<dyn UsageSampler>, UnavailableSampler> {
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(crate::native::procfs::ProcfsSampler::new()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(UnavailableSampler("procfs"))
    }
}

fn win32() -> Result<Arc<dyn UsageSampler>, UnavailableSampler> {
    #[cfg(windows)]
    {
        Ok(Arc::new(crate::native::win32::Win32Sampler))
    }
    #[cfg(not(windows))]
    {
        Err(UnavailableSampler("win32"))
    }
}
