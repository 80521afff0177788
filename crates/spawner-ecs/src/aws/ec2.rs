//! EC2 Query protocol responses.

use serde::Deserialize;

use crate::error::BackendError;

pub(crate) const API_VERSION: &str = "2016-11-15";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeNetworkInterfacesResponse {
    #[serde(default)]
    network_interface_set: NetworkInterfaceSet,
}

#[derive(Debug, Default, Deserialize)]
struct NetworkInterfaceSet {
    #[serde(rename = "item", default)]
    items: Vec<NetworkInterface>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterface {
    #[serde(default)]
    association: Option<Association>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Association {
    #[serde(default)]
    public_ip: Option<String>,
}

/// Public IP of the interface in a DescribeNetworkInterfaces answer.
///
/// An interface without a public association yields an empty string.
pub(crate) fn public_ip(eni: &str, xml: &str) -> Result<String, BackendError> {
    let response: DescribeNetworkInterfacesResponse = quick_xml::de::from_str(xml)
        .map_err(|e| BackendError::Malformed(format!("describe network interfaces: {e}")))?;
    let interface = response
        .network_interface_set
        .items
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::Failure(format!("no interface found for {eni}")))?;
    Ok(interface
        .association
        .and_then(|a| a.public_ip)
        .unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "Errors")]
    errors: Errors,
}

#[derive(Debug, Deserialize)]
struct Errors {
    #[serde(rename = "Error", default)]
    error: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Turn an EC2 error body into an API error.
pub(crate) fn error_from_body(status: u16, xml: &str) -> BackendError {
    match quick_xml::de::from_str::<ErrorResponse>(xml) {
        Ok(response) => match response.errors.error.into_iter().next() {
            Some(detail) => BackendError::Api {
                code: detail.code,
                message: detail.message,
            },
            None => BackendError::Api {
                code: format!("HTTP {status}"),
                message: String::new(),
            },
        },
        Err(_) => BackendError::Api {
            code: format!("HTTP {status}"),
            message: xml.chars().take(200).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DescribeNetworkInterfacesResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
    <requestId>fc45294c-example</requestId>
    <networkInterfaceSet>
        <item>
            <networkInterfaceId>eni-0abc</networkInterfaceId>
            <subnetId>subnet-1234</subnetId>
            <status>in-use</status>
            <privateIpAddress>10.0.1.7</privateIpAddress>
            <association>
                <publicIp>203.0.113.7</publicIp>
                <publicDnsName>ec2-203-0-113-7.eu-west-1.compute.amazonaws.com</publicDnsName>
                <ipOwnerId>amazon</ipOwnerId>
            </association>
        </item>
    </networkInterfaceSet>
</DescribeNetworkInterfacesResponse>"#;

    #[test]
    fn test_public_ip() {
        assert_eq!(public_ip("eni-0abc", RESPONSE).unwrap(), "203.0.113.7");
    }

    #[test]
    fn test_interface_without_association() {
        let xml = r#"<DescribeNetworkInterfacesResponse>
            <networkInterfaceSet><item><networkInterfaceId>eni-0abc</networkInterfaceId></item></networkInterfaceSet>
        </DescribeNetworkInterfacesResponse>"#;
        assert_eq!(public_ip("eni-0abc", xml).unwrap(), "");
    }

    #[test]
    fn test_no_interface() {
        let xml = r#"<DescribeNetworkInterfacesResponse><networkInterfaceSet/></DescribeNetworkInterfacesResponse>"#;
        let err = public_ip("eni-0abc", xml).unwrap_err();
        assert_eq!(err.to_string(), "no interface found for eni-0abc");
    }

    #[test]
    fn test_error_body() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<Response><Errors><Error><Code>InvalidNetworkInterfaceID.NotFound</Code><Message>The networkInterface ID 'eni-0abc' does not exist</Message></Error></Errors><RequestID>ea966190-example</RequestID></Response>"#;
        let err = error_from_body(400, xml);
        assert!(matches!(
            err,
            BackendError::Api { ref code, .. } if code == "InvalidNetworkInterfaceID.NotFound"
        ));
    }
}
