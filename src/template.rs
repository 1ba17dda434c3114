//! CloudFormation template synthesis.
//!
//! Takes one service, its address plan, and the shared infrastructure
//! handles, and produces the full template: per-zone public subnets routed
//! through the shared internet gateway, a Fargate service wired into the
//! shared ALB listener via a host-header rule, a DNS-validated certificate,
//! and an alias record for the service hostname.

use serde_json::{json, Map, Value};

use crate::imports::SharedInfra;
use crate::plan::AddressPlan;

/// Every service container listens on this port; the ALB terminates TLS.
const CONTAINER_PORT: u16 = 80;

/// A service entry with its derived values filled in.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub app_name: String,

    /// `<dns_record>.<domain>`, the externally resolvable hostname.
    pub dns_name: String,

    /// `<registry_namespace>/<app_name>`.
    pub image: String,

    /// Tag value identifying the service on taggable resources.
    pub service_tag: String,
}

pub fn synthesize(service: &ServiceSpec, plan: &AddressPlan, shared: &SharedInfra) -> Value {
    let mut resources = Map::new();

    let service_tags = json!([{ "Key": "service", "Value": service.service_tag }]);

    let mut subnet_refs = Vec::new();
    for (zone_index, cidr_block) in plan.subnet_blocks.iter().enumerate() {
        let subnet_id = format!("Subnet{}", zone_index);
        let route_table_id = format!("RouteTable{}", zone_index);

        resources.insert(
            subnet_id.clone(),
            json!({
                "Type": "AWS::EC2::Subnet",
                "Properties": {
                    "VpcId": shared.vpc_id,
                    "AvailabilityZone": { "Fn::Select": [zone_index, { "Fn::GetAZs": "" }] },
                    "CidrBlock": cidr_block,
                    "MapPublicIpOnLaunch": true,
                    "Tags": service_tags,
                },
            }),
        );
        resources.insert(
            route_table_id.clone(),
            json!({
                "Type": "AWS::EC2::RouteTable",
                "Properties": { "VpcId": shared.vpc_id },
            }),
        );
        resources.insert(
            format!("RouteTableAssociation{}", zone_index),
            json!({
                "Type": "AWS::EC2::SubnetRouteTableAssociation",
                "Properties": {
                    "SubnetId": { "Ref": subnet_id },
                    "RouteTableId": { "Ref": route_table_id },
                },
            }),
        );
        resources.insert(
            format!("PublicRouting{}", zone_index),
            json!({
                "Type": "AWS::EC2::Route",
                "Properties": {
                    "RouteTableId": { "Ref": route_table_id },
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "GatewayId": shared.igw_id,
                },
            }),
        );

        subnet_refs.push(json!({ "Ref": subnet_id }));
    }

    resources.insert(
        String::from("ServiceSecurityGroup"),
        json!({
            "Type": "AWS::EC2::SecurityGroup",
            "Properties": {
                "GroupDescription": format!("Service security group for {}", service.app_name),
                "VpcId": shared.vpc_id,
                "SecurityGroupIngress": [
                    {
                        "Description": "Allow traffic from ELB",
                        "SourceSecurityGroupId": shared.alb_security_group_id,
                        "IpProtocol": "tcp",
                        "FromPort": CONTAINER_PORT,
                        "ToPort": CONTAINER_PORT,
                    },
                    {
                        "CidrIp": "0.0.0.0/0",
                        "IpProtocol": "tcp",
                        "FromPort": CONTAINER_PORT,
                        "ToPort": CONTAINER_PORT,
                    },
                ],
            },
        }),
    );

    resources.insert(
        String::from("TaskDefinition"),
        json!({
            "Type": "AWS::ECS::TaskDefinition",
            "Properties": {
                "RequiresCompatibilities": ["FARGATE"],
                "Cpu": "256",
                "Memory": "512",
                "NetworkMode": "awsvpc",
                "ContainerDefinitions": [{
                    "Name": format!("{}-container", service.app_name),
                    "Image": service.image,
                    "Essential": true,
                    "PortMappings": [{ "ContainerPort": CONTAINER_PORT, "Protocol": "tcp" }],
                }],
            },
        }),
    );

    resources.insert(
        String::from("TargetGroup"),
        json!({
            "Type": "AWS::ElasticLoadBalancingV2::TargetGroup",
            "Properties": {
                "Port": CONTAINER_PORT,
                "Protocol": "HTTP",
                "TargetType": "ip",
                "VpcId": shared.vpc_id,
                "HealthCheckEnabled": true,
            },
        }),
    );

    resources.insert(
        String::from("ListenerRule"),
        json!({
            "Type": "AWS::ElasticLoadBalancingV2::ListenerRule",
            "Properties": {
                "ListenerArn": shared.alb_listener_arn,
                "Priority": plan.routing_priority,
                "Conditions": [{
                    "Field": "host-header",
                    "HostHeaderConfig": { "Values": [service.dns_name] },
                }],
                "Actions": [{
                    "Type": "forward",
                    "TargetGroupArn": { "Ref": "TargetGroup" },
                }],
            },
        }),
    );

    resources.insert(
        String::from("DefaultCertificate"),
        json!({
            "Type": "AWS::CertificateManager::Certificate",
            "Properties": {
                "DomainName": service.dns_name,
                "ValidationMethod": "DNS",
                "DomainValidationOptions": [{
                    "DomainName": service.dns_name,
                    "HostedZoneId": shared.hosted_zone_id,
                }],
            },
        }),
    );

    resources.insert(
        String::from("ListenerCertificate"),
        json!({
            "Type": "AWS::ElasticLoadBalancingV2::ListenerCertificate",
            "Properties": {
                "ListenerArn": shared.alb_listener_arn,
                "Certificates": [{ "CertificateArn": { "Ref": "DefaultCertificate" } }],
            },
        }),
    );

    resources.insert(
        String::from("Service"),
        json!({
            "Type": "AWS::ECS::Service",
            // The target group must be attached to the load balancer before
            // ECS is allowed to register targets into it.
            "DependsOn": "ListenerRule",
            "Properties": {
                "Cluster": shared.cluster_name,
                "LaunchType": "FARGATE",
                "DesiredCount": 1,
                "TaskDefinition": { "Ref": "TaskDefinition" },
                "NetworkConfiguration": {
                    "AwsvpcConfiguration": {
                        "AssignPublicIp": "ENABLED",
                        "Subnets": subnet_refs,
                        "SecurityGroups": [{ "Ref": "ServiceSecurityGroup" }],
                    },
                },
                "LoadBalancers": [{
                    "ContainerName": format!("{}-container", service.app_name),
                    "ContainerPort": CONTAINER_PORT,
                    "TargetGroupArn": { "Ref": "TargetGroup" },
                }],
                "Tags": service_tags,
            },
        }),
    );

    resources.insert(
        String::from("DnsRecord"),
        json!({
            "Type": "AWS::Route53::RecordSet",
            "Properties": {
                "HostedZoneId": shared.hosted_zone_id,
                "Name": service.dns_name,
                "Type": "A",
                "AliasTarget": {
                    "DNSName": shared.alb_dns_name,
                    "HostedZoneId": shared.alb_canonical_hosted_zone_id,
                },
            },
        }),
    );

    json!({
        "AWSTemplateFormatVersion": "2010-09-09",
        "Description": format!("Fargate service stack for {}", service.app_name),
        "Resources": resources,
        "Outputs": {
            "DnsName": {
                "Description": "Externally resolvable hostname of the service",
                "Value": service.dns_name,
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::synthesize;
    use super::ServiceSpec;
    use crate::imports::SharedInfra;
    use crate::plan::AddressPlan;

    fn sample_shared() -> SharedInfra {
        let exports: HashMap<String, String> = [
            (crate::imports::VPC_ID, "vpc-0123"),
            (crate::imports::IGW_ID, "igw-0123"),
            (crate::imports::ALB_SECURITY_GROUP_ID, "sg-0123"),
            (crate::imports::ALB_LISTENER_ARN, "arn:listener"),
            (crate::imports::ALB_DNS_NAME, "core-123.elb.amazonaws.com"),
            (crate::imports::ALB_CANONICAL_HOSTED_ZONE_ID, "ZHURV8PSTC4K8"),
            (crate::imports::CLUSTER_NAME, "core-cluster"),
            (crate::imports::HOSTED_ZONE_ID, "Z042333"),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

        SharedInfra::from_exports(&exports).unwrap()
    }

    fn sample_service() -> ServiceSpec {
        ServiceSpec {
            app_name: String::from("hujia"),
            dns_name: String::from("hujia.dliu.com"),
            image: String::from("deweiliu/hujia"),
            service_tag: String::from("hujia"),
        }
    }

    #[test]
    fn one_subnet_per_zone() {
        let plan = AddressPlan::compute(3, 2).unwrap();
        let template = synthesize(&sample_service(), &plan, &sample_shared());

        let resources = &template["Resources"];
        assert_eq!(
            resources["Subnet0"]["Properties"]["CidrBlock"],
            "10.0.3.0/28"
        );
        assert_eq!(
            resources["Subnet1"]["Properties"]["CidrBlock"],
            "10.0.3.16/28"
        );
        assert!(resources.get("Subnet2").is_none());

        assert_eq!(
            resources["PublicRouting1"]["Properties"]["GatewayId"],
            "igw-0123"
        );
    }

    #[test]
    fn listener_rule_carries_priority_and_host_header() {
        let plan = AddressPlan::compute(3, 2).unwrap();
        let template = synthesize(&sample_service(), &plan, &sample_shared());

        let rule = &template["Resources"]["ListenerRule"]["Properties"];
        assert_eq!(rule["Priority"], 30);
        assert_eq!(rule["ListenerArn"], "arn:listener");
        assert_eq!(
            rule["Conditions"][0]["HostHeaderConfig"]["Values"][0],
            "hujia.dliu.com"
        );
    }

    #[test]
    fn service_registers_every_subnet() {
        let plan = AddressPlan::compute(12, 3).unwrap();
        let template = synthesize(&sample_service(), &plan, &sample_shared());

        let network = &template["Resources"]["Service"]["Properties"]
            ["NetworkConfiguration"]["AwsvpcConfiguration"];
        assert_eq!(network["Subnets"].as_array().unwrap().len(), 3);
        assert_eq!(network["AssignPublicIp"], "ENABLED");

        assert_eq!(
            template["Resources"]["Service"]["Properties"]["Cluster"],
            "core-cluster"
        );
    }

    #[test]
    fn certificate_validates_against_the_hosted_zone() {
        let plan = AddressPlan::compute(3, 2).unwrap();
        let template = synthesize(&sample_service(), &plan, &sample_shared());

        let certificate = &template["Resources"]["DefaultCertificate"]["Properties"];
        assert_eq!(certificate["DomainName"], "hujia.dliu.com");
        assert_eq!(
            certificate["DomainValidationOptions"][0]["HostedZoneId"],
            "Z042333"
        );
    }

    #[test]
    fn dns_record_aliases_the_alb() {
        let plan = AddressPlan::compute(3, 2).unwrap();
        let template = synthesize(&sample_service(), &plan, &sample_shared());

        let record = &template["Resources"]["DnsRecord"]["Properties"];
        assert_eq!(record["Type"], "A");
        assert_eq!(record["AliasTarget"]["DNSName"], "core-123.elb.amazonaws.com");

        assert_eq!(template["Outputs"]["DnsName"]["Value"], "hujia.dliu.com");
    }

    #[test]
    fn synthesis_is_deterministic() {
        let plan = AddressPlan::compute(3, 2).unwrap();
        let first = synthesize(&sample_service(), &plan, &sample_shared());
        let second = synthesize(&sample_service(), &plan, &sample_shared());
        assert_eq!(first, second);
    }
}
