use log::debug;
use sedge_client::LastWill;
use sedge_types::{
  constants::BDSEQ,
  payload::{metric, DataType, Metric, Payload},
};

/// The NDEATH payload: only the bdSeq metric, no sequence number.
pub(crate) fn death_payload(bdseq: u8) -> Payload {
  Payload {
    metrics: vec![bdseq_metric(bdseq)],
    ..Default::default()
  }
}

pub(crate) fn bdseq_metric(bdseq: u8) -> Metric {
  let mut metric = Metric::new();
  metric
    .set_name(BDSEQ.to_string())
    .set_datatype(DataType::Int64)
    .set_value(metric::Value::LongValue(bdseq as u64));
  metric
}

/// Computes the will a node registers with the broker.
///
/// The coordinator remembers the bdSeq it last promised so births and explicit
/// deaths can be checked against it.
pub struct LwtCoordinator {
  group_id: String,
  node_id: String,
  advertised_bdseq: Option<u8>,
}

impl LwtCoordinator {
  pub fn new(group_id: &str, node_id: &str) -> Self {
    Self {
      group_id: group_id.to_string(),
      node_id: node_id.to_string(),
      advertised_bdseq: None,
    }
  }

  /// Build the death announcement promising `bdseq`, the value the next node birth will use.
  pub fn compute(&mut self, bdseq: u8) -> LastWill {
    debug!("Computed will. node={} bdseq={bdseq}", self.node_id);
    self.advertised_bdseq = Some(bdseq);
    LastWill::new_node(&self.group_id, &self.node_id, death_payload(bdseq))
  }

  /// The bdSeq of the most recently computed will, if any
  pub fn advertised_bdseq(&self) -> Option<u8> {
    self.advertised_bdseq
  }
}
