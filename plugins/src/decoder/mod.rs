pub mod gobuster;
pub mod masscan;
pub mod nikto;
pub mod nmap;
pub mod whatweb;

pub use gobuster::GobusterDecoder;
pub use masscan::MasscanDecoder;
pub use nikto::NiktoDecoder;
pub use nmap::NmapDecoder;
pub use whatweb::WhatwebDecoder;
