//! Shared infrastructure handles.
//!
//! The core network stack (VPC, internet gateway, ALB, ECS cluster, hosted
//! zone) is owned by a separate deployment and published through
//! CloudFormation exports. This module resolves those exports once, at
//! startup, into a [`SharedInfra`] value that is passed explicitly to the
//! synthesizer; nothing else in the program looks infrastructure up by name.

use std::collections::HashMap;

use aws_config::meta::region::RegionProviderChain;
use aws_types::region::Region;

pub const VPC_ID: &str = "Core-Vpc";
pub const IGW_ID: &str = "Core-InternetGateway";
pub const ALB_SECURITY_GROUP_ID: &str = "Core-AlbSecurityGroup";
pub const ALB_LISTENER_ARN: &str = "Core-AlbListener";
pub const ALB_DNS_NAME: &str = "Core-AlbDns";
pub const ALB_CANONICAL_HOSTED_ZONE_ID: &str = "Core-AlbCanonicalHostedZone";
pub const CLUSTER_NAME: &str = "Core-ClusterName";
pub const HOSTED_ZONE_ID: &str = "DLIUCOMHostedZoneID";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Service error ocurred: {0}.")]
    ServiceError(String),

    #[error("Unknown error ocurred: {0}.")]
    UnknownError(String),

    #[error("Export {0} not found")]
    ExportNotFound(String),

    #[error("No AWS region configured")]
    NoRegion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedInfra {
    pub vpc_id: String,
    pub igw_id: String,
    pub alb_security_group_id: String,
    pub alb_listener_arn: String,
    pub alb_dns_name: String,
    pub alb_canonical_hosted_zone_id: String,
    pub cluster_name: String,
    pub hosted_zone_id: String,
}

impl SharedInfra {
    /// Binds the well-known export names against a fetched export map. Pure;
    /// a missing export fails with the name that was expected.
    pub fn from_exports(exports: &HashMap<String, String>) -> Result<Self, Error> {
        let get = |name: &str| {
            exports
                .get(name)
                .cloned()
                .ok_or_else(|| Error::ExportNotFound(name.to_string()))
        };

        Ok(Self {
            vpc_id: get(VPC_ID)?,
            igw_id: get(IGW_ID)?,
            alb_security_group_id: get(ALB_SECURITY_GROUP_ID)?,
            alb_listener_arn: get(ALB_LISTENER_ARN)?,
            alb_dns_name: get(ALB_DNS_NAME)?,
            alb_canonical_hosted_zone_id: get(ALB_CANONICAL_HOSTED_ZONE_ID)?,
            cluster_name: get(CLUSTER_NAME)?,
            hosted_zone_id: get(HOSTED_ZONE_ID)?,
        })
    }

    pub async fn fetch(region: Option<&String>) -> Result<Self, Error> {
        let exports = fetch_exports(region).await?;
        Self::from_exports(&exports)
    }
}

async fn make_client(region: Option<&String>) -> Result<aws_sdk_cloudformation::Client, Error> {
    let region = match region {
        Some(provided_region) => Region::new(provided_region.clone()),
        None => RegionProviderChain::default_provider()
            .region()
            .await
            .ok_or(Error::NoRegion)?,
    };

    let sdk_config = aws_config::from_env().region(region).load().await;
    Ok(aws_sdk_cloudformation::Client::new(&sdk_config))
}

/// Lists every CloudFormation export in the region, following pagination.
pub async fn fetch_exports(region: Option<&String>) -> Result<HashMap<String, String>, Error> {
    let client = make_client(region).await?;

    let mut exports = HashMap::new();
    let mut next_token: Option<String> = None;

    loop {
        let result = client
            .list_exports()
            .set_next_token(next_token.clone())
            .send()
            .await;

        let result = match result {
            Ok(data) => data,
            Err(aws_sdk_cloudformation::types::SdkError::ServiceError { err, .. }) => {
                return Err(Error::ServiceError(err.to_string()));
            }
            Err(err) => return Err(Error::UnknownError(err.to_string())),
        };

        for export in result.exports().unwrap_or_else(|| &[]) {
            if let (Some(name), Some(value)) = (export.name(), export.value()) {
                exports.insert(name.to_string(), value.to_string());
            }
        }

        next_token = result.next_token().map(String::from);
        if next_token.is_none() {
            break;
        }
    }

    Ok(exports)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::Error;
    use super::SharedInfra;

    fn full_exports() -> HashMap<String, String> {
        [
            (super::VPC_ID, "vpc-0123"),
            (super::IGW_ID, "igw-0123"),
            (super::ALB_SECURITY_GROUP_ID, "sg-0123"),
            (
                super::ALB_LISTENER_ARN,
                "arn:aws:elasticloadbalancing:eu-west-2:111:listener/app/core/abc/def",
            ),
            (super::ALB_DNS_NAME, "core-123.eu-west-2.elb.amazonaws.com"),
            (super::ALB_CANONICAL_HOSTED_ZONE_ID, "ZHURV8PSTC4K8"),
            (super::CLUSTER_NAME, "core-cluster"),
            (super::HOSTED_ZONE_ID, "Z0423337205LNJ14JVEXA"),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
    }

    #[test]
    fn binds_all_exports() {
        let shared = SharedInfra::from_exports(&full_exports()).unwrap();
        assert_eq!(shared.vpc_id, "vpc-0123");
        assert_eq!(shared.cluster_name, "core-cluster");
        assert_eq!(shared.hosted_zone_id, "Z0423337205LNJ14JVEXA");
    }

    #[test]
    fn missing_export_names_the_export() {
        let mut exports = full_exports();
        exports.remove(super::IGW_ID);

        let result = SharedInfra::from_exports(&exports);
        assert_eq!(
            result.err().unwrap(),
            Error::ExportNotFound(String::from(super::IGW_ID))
        );
    }
}
