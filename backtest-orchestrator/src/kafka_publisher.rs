//! Thin adapter satisfying `backtest_core::pipeline::CalcRequestPublisher` so the
//! pipeline stays decoupled from a concrete `FutureProducer`.

use async_trait::async_trait;
use backtest_core::pipeline::CalcRequestPublisher;
use backtest_core::resolver::IndicatorCalculationRequest;
use common_kafka::kafka_producer::{send_iter_to_kafka, KafkaContext, KafkaProduceError};
use rdkafka::producer::FutureProducer;

pub struct CalcRequestProducer {
    producer: FutureProducer<KafkaContext>,
    topic: String,
}

impl CalcRequestProducer {
    pub fn new(producer: FutureProducer<KafkaContext>, topic: String) -> Self {
        Self { producer, topic }
    }
}

#[async_trait]
impl CalcRequestPublisher for CalcRequestProducer {
    async fn publish(&self, request: &IndicatorCalculationRequest) -> Result<(), KafkaProduceError> {
        send_iter_to_kafka(&self.producer, &self.topic, [request.clone()]).await
    }
}
