//! Renders an API descriptor into a portal-style XML bundle.
//!
//! The output contains a policy fragment item, a service item and the
//! mappings section. Every piece of descriptor text is escaped, and the
//! policies embedded in the items are escaped once more as element text.

use crate::{
    descriptor::ApiDescriptor,
    graphman::HttpMethod,
    portal::{INCLUDE, NEW_OR_UPDATE, POLICY, SERVICE},
};
use quick_xml::escape::escape;

const L7_NS: &str = "http://ns.l7tech.com/2010/04/gateway-management";
const POLICY_NS: &str = "http://www.layer7tech.com/ws/policy";
const WSP_NS: &str = "http://schemas.xmlsoap.org/ws/2002/12/policy";
const WSDL_NS: &str = "http://schemas.xmlsoap.org/wsdl/";

/// The variable that carries the portal API identifier through the service
/// policy.
pub const API_ID_VARIABLE: &str = "portal.managed.service.apiId";

pub fn render(api: &ApiDescriptor) -> String {
    let fragment_name = api.fragment_name();
    let fragment_guid = api.fragment_guid();
    let fragment_id = fragment_guid.replace('-', "");
    let service_id = api.service_id();

    let mut xml = Writer::with_capacity(4096);
    xml.raw(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.open("l7:Bundle", &[("xmlns:l7", L7_NS)]);
    xml.open("l7:References", &[]);

    // Policy fragment
    xml.open("l7:Item", &[]);
    xml.leaf("l7:Name", &[], &fragment_name);
    xml.leaf("l7:Id", &[], &fragment_id);
    xml.leaf("l7:Type", &[], POLICY);
    xml.open("l7:Resource", &[]);
    xml.open("l7:Policy", &[("guid", &fragment_guid), ("id", &fragment_id)]);
    xml.open(
        "l7:PolicyDetail",
        &[("guid", &fragment_guid), ("id", &fragment_id)],
    );
    xml.leaf("l7:Name", &[], &fragment_name);
    xml.leaf("l7:PolicyType", &[], INCLUDE);
    xml.close("l7:PolicyDetail");
    xml.open("l7:Resources", &[]);
    xml.open("l7:ResourceSet", &[("tag", "policy")]);
    xml.leaf("l7:Resource", &[("type", "policy")], &fragment_policy(api));
    xml.close("l7:ResourceSet");
    xml.close("l7:Resources");
    xml.close("l7:Policy");
    xml.close("l7:Resource");
    xml.close("l7:Item");

    // Service
    xml.open("l7:Item", &[]);
    xml.leaf("l7:Name", &[], &api.name);
    xml.leaf("l7:Id", &[], &service_id);
    xml.leaf("l7:Type", &[], SERVICE);
    xml.open("l7:Resource", &[]);
    xml.open("l7:Service", &[("id", &service_id)]);
    xml.open("l7:ServiceDetail", &[("id", &service_id)]);
    xml.leaf("l7:Name", &[], &api.name);
    xml.leaf("l7:Enabled", &[], if api.enabled { "true" } else { "false" });
    xml.open("l7:ServiceMappings", &[]);
    xml.open("l7:HttpMapping", &[]);
    xml.leaf("l7:UrlPattern", &[], &api.url_pattern());
    xml.open("l7:Verbs", &[]);
    let verbs: &[HttpMethod] = if api.is_soap() {
        &HttpMethod::SOAP
    } else {
        &HttpMethod::REST
    };
    for verb in verbs {
        xml.leaf("l7:Verb", &[], verb.as_str());
    }
    xml.close("l7:Verbs");
    xml.close("l7:HttpMapping");
    xml.close("l7:ServiceMappings");
    xml.open("l7:Properties", &[]);
    for field in &api.custom_fields {
        let key = format!("property.{}", field.name);
        xml.open("l7:Property", &[("key", &key)]);
        xml.leaf("l7:StringValue", &[], &field.value);
        xml.close("l7:Property");
    }
    xml.open("l7:Property", &[("key", "soap")]);
    xml.leaf(
        "l7:BooleanValue",
        &[],
        if api.is_soap() { "true" } else { "false" },
    );
    xml.close("l7:Property");
    xml.close("l7:Properties");
    xml.close("l7:ServiceDetail");
    xml.open("l7:Resources", &[]);
    xml.open("l7:ResourceSet", &[("tag", "policy")]);
    xml.leaf(
        "l7:Resource",
        &[("type", "policy")],
        &service_policy(api, &fragment_guid),
    );
    xml.close("l7:ResourceSet");
    if api.is_soap() {
        let location = api.location_url.as_deref().unwrap_or_default();
        xml.open("l7:ResourceSet", &[("rootUrl", location), ("tag", "wsdl")]);
        xml.leaf(
            "l7:Resource",
            &[("sourceUrl", location), ("type", "wsdl")],
            &wsdl(api),
        );
        xml.close("l7:ResourceSet");
    }
    xml.close("l7:Resources");
    xml.close("l7:Service");
    xml.close("l7:Resource");
    xml.close("l7:Item");

    xml.close("l7:References");

    xml.open("l7:Mappings", &[]);
    xml.empty(
        "l7:Mapping",
        &[
            ("action", NEW_OR_UPDATE),
            ("srcId", &fragment_id),
            ("type", POLICY),
        ],
    );
    xml.empty(
        "l7:Mapping",
        &[
            ("action", NEW_OR_UPDATE),
            ("srcId", &service_id),
            ("type", SERVICE),
        ],
    );
    xml.close("l7:Mappings");
    xml.close("l7:Bundle");
    xml.finish()
}

/// The fragment invokes each of the API's policy templates with its
/// arguments, in order.
fn fragment_policy(api: &ApiDescriptor) -> String {
    let mut xml = Writer::with_capacity(1024);
    xml.open("wsp:Policy", &[("xmlns:L7p", POLICY_NS), ("xmlns:wsp", WSP_NS)]);
    xml.open("wsp:All", &[("wsp:Usage", "Required")]);
    if api.policy_entities.is_empty() {
        xml.empty("L7p:TrueAssertion", &[]);
    }
    for entity in &api.policy_entities {
        xml.open("L7p:Encapsulated", &[]);
        xml.empty(
            "L7p:EncapsulatedAssertionConfigGuid",
            &[("stringValue", &entity.policy_entity_uuid)],
        );
        xml.open("L7p:Parameters", &[]);
        for arg in &entity.policy_template_arguments {
            xml.open("L7p:entry", &[]);
            xml.empty("L7p:key", &[("stringValue", &arg.name)]);
            xml.empty("L7p:value", &[("stringValue", &arg.value)]);
            xml.close("L7p:entry");
        }
        xml.close("L7p:Parameters");
        xml.close("L7p:Encapsulated");
    }
    xml.close("wsp:All");
    xml.close("wsp:Policy");
    xml.finish()
}

fn service_policy(api: &ApiDescriptor, fragment_guid: &str) -> String {
    let mut xml = Writer::with_capacity(512);
    xml.open("wsp:Policy", &[("xmlns:L7p", POLICY_NS), ("xmlns:wsp", WSP_NS)]);
    xml.open("wsp:All", &[("wsp:Usage", "Required")]);
    xml.open("L7p:SetVariable", &[]);
    xml.empty("L7p:Expression", &[("stringValue", &api.uuid)]);
    xml.empty("L7p:VariableToSet", &[("stringValue", API_ID_VARIABLE)]);
    xml.close("L7p:SetVariable");
    xml.open("L7p:Include", &[]);
    xml.empty("L7p:PolicyGuid", &[("stringValue", fragment_guid)]);
    xml.close("L7p:Include");
    xml.close("wsp:All");
    xml.close("wsp:Policy");
    xml.finish()
}

fn wsdl(api: &ApiDescriptor) -> String {
    if let Some(wsdl) = api.wsdl.as_deref().filter(|w| !w.trim().is_empty()) {
        return wsdl.to_string();
    }
    let target = api
        .location_url
        .clone()
        .unwrap_or_else(|| format!("urn:{}", api.short_id()));
    let mut xml = Writer::with_capacity(256);
    xml.empty(
        "wsdl:definitions",
        &[
            ("xmlns:wsdl", WSDL_NS),
            ("name", &api.name),
            ("targetNamespace", &target),
        ],
    );
    xml.finish()
}

/// Appends escaped markup to a string buffer.
struct Writer(String);

impl Writer {
    fn with_capacity(capacity: usize) -> Self {
        Self(String::with_capacity(capacity))
    }

    fn raw(&mut self, s: &str) {
        self.0.push_str(s);
    }

    fn start(&mut self, tag: &str, attrs: &[(&str, &str)]) {
        self.0.push('<');
        self.0.push_str(tag);
        for (key, value) in attrs {
            self.0.push(' ');
            self.0.push_str(key);
            self.0.push_str("=\"");
            self.0.push_str(&escape(*value));
            self.0.push('"');
        }
    }

    fn open(&mut self, tag: &str, attrs: &[(&str, &str)]) {
        self.start(tag, attrs);
        self.0.push('>');
    }

    fn empty(&mut self, tag: &str, attrs: &[(&str, &str)]) {
        self.start(tag, attrs);
        self.0.push_str("/>");
    }

    fn leaf(&mut self, tag: &str, attrs: &[(&str, &str)], text: &str) {
        self.open(tag, attrs);
        self.0.push_str(&escape(text));
        self.close(tag);
    }

    fn close(&mut self, tag: &str) {
        self.0.push_str("</");
        self.0.push_str(tag);
        self.0.push('>');
    }

    fn finish(self) -> String {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        descriptor::{NameValue, PolicyEntity, ServiceType},
        portal::{self, Resource},
    };

    fn booking() -> ApiDescriptor {
        ApiDescriptor {
            uuid: "6f1c1c1e-0000-4000-8000-00000000b00c".to_string(),
            name: "Booking".to_string(),
            base_path: "bookings".to_string(),
            custom_fields: vec![NameValue {
                name: "Custom Field 1".to_string(),
                value: "three".to_string(),
            }],
            ..Default::default()
        }
    }

    fn service(bundle: &portal::PortalBundle) -> &portal::ServiceResource {
        bundle
            .items
            .iter()
            .find_map(|i| match &i.resource {
                Resource::Service(s) => Some(s),
                _ => None,
            })
            .expect("service item")
    }

    #[test]
    fn renders_rest_service() {
        let xml = render(&booking());
        let bundle = portal::parse(&xml).unwrap();
        assert_eq!(bundle.items.len(), 2);
        assert_eq!(bundle.items[0].name, "Booking-fragment");
        assert_eq!(bundle.items[1].name, "Booking");

        let svc = service(&bundle);
        assert_eq!(svc.url_pattern, "/bookings*");
        assert_eq!(
            svc.verbs,
            vec!["GET", "POST", "PUT", "DELETE", "OPTIONS", "PATCH", "HEAD"]
        );
        assert_eq!(svc.properties[0].key, "property.Custom Field 1");
        assert_eq!(
            svc.properties[0].value,
            portal::PropertyValue::String("three".to_string())
        );
        assert_eq!(svc.wsdl, None);
        assert_eq!(bundle.mappings.len(), 2);
        assert!(bundle.mappings.iter().all(|m| m.action == NEW_OR_UPDATE));
    }

    #[test]
    fn renders_soap_service() {
        let api = ApiDescriptor {
            service_type: ServiceType::Soap,
            location_url: Some("https://backend.example.com/booking?wsdl".to_string()),
            ..booking()
        };
        let bundle = portal::parse(&render(&api)).unwrap();
        let svc = service(&bundle);
        assert_eq!(svc.verbs, vec!["GET", "POST"]);
        let wsdl = svc.wsdl.as_deref().expect("wsdl section");
        assert!(wsdl.contains("wsdl:definitions"));
    }

    #[test]
    fn rendering_is_deterministic() {
        assert_eq!(render(&booking()), render(&booking()));
    }

    #[test]
    fn escapes_descriptor_text() {
        let api = ApiDescriptor {
            name: r#"</l7:Name><l7:Type>SERVICE"&'"#.to_string(),
            base_path: "a<b".to_string(),
            custom_fields: vec![NameValue {
                name: "x\"><inject".to_string(),
                value: "]]><&".to_string(),
            }],
            policy_entities: vec![PolicyEntity {
                policy_entity_uuid: "\"/><L7p:Evil/>".to_string(),
                policy_template_arguments: vec![NameValue {
                    name: "k".to_string(),
                    value: "<v>".to_string(),
                }],
            }],
            ..booking()
        };
        let bundle = portal::parse(&render(&api)).unwrap();
        assert_eq!(bundle.items.len(), 2);
        assert_eq!(bundle.items[1].name, api.name);

        let svc = service(&bundle);
        assert_eq!(svc.url_pattern, "/a<b*");
        assert_eq!(svc.properties[0].key, "property.x\"><inject");

        // The fragment policy is itself well-formed once unescaped.
        let Resource::Policy(ref fragment) = bundle.items[0].resource else {
            panic!("expected a policy item");
        };
        let mut reader = quick_xml::Reader::from_str(&fragment.policy);
        loop {
            match reader.read_event().unwrap() {
                quick_xml::events::Event::Eof => break,
                quick_xml::events::Event::Start(e) | quick_xml::events::Event::Empty(e) => {
                    assert_ne!(e.local_name().as_ref(), b"Evil");
                }
                _ => {}
            }
        }
    }
}
