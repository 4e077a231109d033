//! skimmer - cloud-granule photon subsetting engine for ICESat-2 and GEDI
//! laser altimetry.
//!
//! A reader opens a remote granule through the chunked-variable fetcher,
//! narrows each enabled beam to a caller-supplied region of interest,
//! applies the mission's science filters and derived computations, and
//! streams framed measurement records to a bounded output queue. The ATL03
//! bathymetry pipeline additionally locates the sea surface per extent,
//! corrects sub-surface photons for refraction, and attaches total
//! horizontal/vertical uncertainties.

pub mod alerts;
pub mod atl03;
pub mod atl03_bathy;
pub mod atl06;
pub mod atl13;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetch;
pub mod gedi;
pub mod granule;
pub mod mask;
pub mod oceaneyes;
pub mod publisher;
pub mod raster;
pub mod reader;
pub mod records;
pub mod region;
pub mod stats;
pub mod utm;
