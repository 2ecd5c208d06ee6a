//! Vigil Source Adapters
//!
//! One adapter per upstream threat-intelligence provider:
//! - **OTX**: AlienVault Open Threat Exchange pulse feed
//! - **XFE**: IBM X-Force Exchange reputation lookups
//! - **VirusTotal**: file/IP reputation
//! - **MISP**: attribute search against a MISP instance
//! - **ThreatFox**: abuse.ch IoC feed
//! - **AbuseIPDB**: IP abuse reports
//! - **Shodan**: host exposure lookups
//!
//! All adapters speak through [`vigil_net::Transport`] and return
//! normalized [`vigil_core::Indicator`] records.

pub mod abuseipdb;
pub mod misp;
pub mod otx;
pub mod shodan;
pub mod threatfox;
pub mod traits;
pub mod virustotal;
pub mod xfe;

pub use abuseipdb::*;
pub use misp::*;
pub use otx::*;
pub use shodan::*;
pub use threatfox::*;
pub use traits::*;
pub use virustotal::*;
pub use xfe::*;
