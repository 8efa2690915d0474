//! Ports module for the accounting oracle

pub mod inbound;
pub mod outbound;

pub use inbound::AccountingOracleApi;
pub use outbound::{
    AccountingSimulator, ChainReader, HashConsensusGateway, ProtocolReader,
    ReportProcessorGateway, WithdrawalQueueGateway,
};
