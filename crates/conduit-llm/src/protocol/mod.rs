//! Wire formats of the supported upstream APIs

pub mod anthropic;
pub mod google;
pub mod openai;
