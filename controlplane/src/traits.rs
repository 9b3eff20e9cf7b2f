use gateway_api::apis::standard::{gatewayclasses::GatewayClass, gateways::Gateway};
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

pub trait HasConditions {
    fn conditions_mut(&mut self) -> &mut Vec<metav1::Condition>;
}

impl HasConditions for Gateway {
    fn conditions_mut(&mut self) -> &mut Vec<metav1::Condition> {
        self.status
            .get_or_insert_with(Default::default)
            .conditions
            .get_or_insert_with(Vec::new)
    }
}

impl HasConditions for GatewayClass {
    fn conditions_mut(&mut self) -> &mut Vec<metav1::Condition> {
        self.status
            .get_or_insert_with(Default::default)
            .conditions
            .get_or_insert_with(Vec::new)
    }
}
