//! The portal-style XML bundle: an ordered list of items followed by the
//! mappings that tell the destination how to resolve each of them.

use quick_xml::events::{BytesStart, Event};
use std::borrow::Cow;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortalBundle {
    pub items: Vec<Item>,
    pub mappings: Vec<Mapping>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub name: String,
    pub id: String,
    pub resource: Resource,
}

/// An item's payload, keyed by the item's `Type`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    Policy(PolicyResource),
    Service(ServiceResource),
    /// Any other item type; carried through parsing and ignored afterwards.
    Unknown(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyResource {
    pub guid: String,
    pub id: String,
    pub name: String,
    pub policy_type: String,
    pub policy: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceResource {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub url_pattern: String,
    pub verbs: Vec<String>,
    pub properties: Vec<Property>,
    pub policy: String,
    pub wsdl: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Property {
    pub key: String,
    pub value: PropertyValue,
}

/// A property holds at most one of a string or a boolean.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyValue {
    String(String),
    Boolean(bool),
    Empty,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mapping {
    pub action: String,
    pub src_id: String,
    pub kind: String,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed XML: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("malformed XML: unexpected end of document inside <{0}>")]
    Unclosed(String),

    #[error("malformed XML: no document element")]
    Empty,

    #[error("expected a <Bundle> document, found <{0}>")]
    NotABundle(String),

    #[error("{kind} item {name:?} has no <{element}> element")]
    Missing {
        kind: &'static str,
        name: String,
        element: &'static str,
    },

    #[error("failed to serialize bundle: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub const POLICY: &str = "POLICY";
pub const SERVICE: &str = "SERVICE";
pub const NEW_OR_UPDATE: &str = "NewOrUpdate";
pub const INCLUDE: &str = "Include";

/// Parses a portal bundle document.
///
/// Namespace prefixes are ignored; elements are matched by local name.
pub fn parse(xml: &str) -> Result<PortalBundle, Error> {
    let root = Element::parse(xml)?;
    if root.name != "Bundle" {
        return Err(Error::NotABundle(root.name));
    }

    let items = root
        .child("References")
        .map(|refs| {
            refs.children("Item")
                .map(Item::from_element)
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?
        .unwrap_or_default();

    let mappings = root
        .child("Mappings")
        .map(|m| {
            m.children("Mapping")
                .map(|m| Mapping {
                    action: m.attr("action").unwrap_or(NEW_OR_UPDATE).to_string(),
                    src_id: m.attr("srcId").unwrap_or_default().to_string(),
                    kind: m.attr("type").unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(PortalBundle { items, mappings })
}

// === impl Item ===

impl Item {
    fn from_element(el: &Element) -> Result<Self, Error> {
        let name = el.text_of("Name").to_string();
        let id = el.text_of("Id").to_string();
        let kind = el.text_of("Type");
        let payload = el.child("Resource");

        let resource = match kind {
            POLICY => {
                let policy = payload.and_then(|r| r.child("Policy")).ok_or_else(|| {
                    Error::Missing {
                        kind: POLICY,
                        name: name.clone(),
                        element: "Policy",
                    }
                })?;
                let detail = policy.child("PolicyDetail");
                Resource::Policy(PolicyResource {
                    guid: policy.attr("guid").unwrap_or_default().to_string(),
                    id: policy.attr("id").unwrap_or_default().to_string(),
                    name: detail.map(|d| d.text_of("Name")).unwrap_or_default().to_string(),
                    policy_type: detail
                        .map(|d| d.text_of("PolicyType"))
                        .unwrap_or_default()
                        .to_string(),
                    policy: resource_set(policy, "policy").unwrap_or_default(),
                })
            }

            SERVICE => {
                let service = payload.and_then(|r| r.child("Service")).ok_or_else(|| {
                    Error::Missing {
                        kind: SERVICE,
                        name: name.clone(),
                        element: "Service",
                    }
                })?;
                let detail = service.child("ServiceDetail").ok_or_else(|| Error::Missing {
                    kind: SERVICE,
                    name: name.clone(),
                    element: "ServiceDetail",
                })?;
                let mapping = detail
                    .child("ServiceMappings")
                    .and_then(|m| m.child("HttpMapping"));
                Resource::Service(ServiceResource {
                    id: service.attr("id").unwrap_or_default().to_string(),
                    name: detail.text_of("Name").to_string(),
                    enabled: detail.text_of("Enabled").eq_ignore_ascii_case("true"),
                    url_pattern: mapping
                        .map(|m| m.text_of("UrlPattern"))
                        .unwrap_or_default()
                        .to_string(),
                    verbs: mapping
                        .and_then(|m| m.child("Verbs"))
                        .map(|v| v.children("Verb").map(|v| v.text.clone()).collect())
                        .unwrap_or_default(),
                    properties: detail
                        .child("Properties")
                        .map(|p| p.children("Property").map(Property::from_element).collect())
                        .unwrap_or_default(),
                    policy: resource_set(service, "policy").unwrap_or_default(),
                    wsdl: resource_set(service, "wsdl"),
                })
            }

            other => Resource::Unknown(other.to_string()),
        };

        Ok(Item { name, id, resource })
    }
}

// === impl Property ===

impl Property {
    fn from_element(el: &Element) -> Self {
        let string = el.child("StringValue").map(|v| v.text.as_str());
        let boolean = el.child("BooleanValue").map(|v| v.text.as_str());
        let value = match (string, boolean) {
            (Some(s), _) if !s.is_empty() => PropertyValue::String(s.to_string()),
            (_, Some(b)) if !b.is_empty() => PropertyValue::Boolean(b.eq_ignore_ascii_case("true")),
            _ => PropertyValue::Empty,
        };
        Property {
            key: el.attr("key").unwrap_or_default().to_string(),
            value,
        }
    }
}

/// Returns the text of the first `<Resource>` in the `<ResourceSet>` tagged
/// `tag`, under an entity's `<Resources>` element.
fn resource_set(entity: &Element, tag: &str) -> Option<String> {
    entity
        .child("Resources")?
        .children("ResourceSet")
        .find(|set| set.attr("tag") == Some(tag))?
        .child("Resource")
        .map(|r| r.text.clone())
}

/// A minimal element tree built from the XML event stream.
#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn parse(xml: &str) -> Result<Self, Error> {
        let mut reader = quick_xml::Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;
        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(Self::open(&start)?),
                Event::Empty(start) => {
                    let el = Self::open(&start)?;
                    Self::close(el, &mut stack, &mut root)?;
                }
                Event::End(_) => {
                    // End names are checked by the reader.
                    let el = stack.pop().ok_or(Error::Empty)?;
                    Self::close(el, &mut stack, &mut root)?;
                }
                Event::Text(text) => {
                    if let Some(el) = stack.last_mut() {
                        el.text.push_str(&text.unescape()?);
                    }
                }
                Event::CData(data) => {
                    if let Some(el) = stack.last_mut() {
                        el.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.pop() {
            return Err(Error::Unclosed(open.name));
        }
        root.ok_or(Error::Empty)
    }

    fn open(start: &BytesStart<'_>) -> Result<Self, Error> {
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attrs.push((key, value));
        }
        Ok(Element {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attrs,
            ..Default::default()
        })
    }

    fn close(el: Element, stack: &mut [Element], root: &mut Option<Element>) -> Result<(), Error> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(el),
            None if root.is_none() => *root = Some(el),
            // A second top-level element.
            None => return Err(Error::NotABundle(el.name)),
        }
        Ok(())
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn text_of(&self, name: &str) -> &str {
        self.child(name).map(|c| c.text.as_str()).unwrap_or_default()
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl PropertyValue {
    /// The value in its textual form, if one is set.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::String(s) => Some(Cow::Borrowed(s.as_str())),
            Self::Boolean(b) => Some(Cow::Owned(b.to_string())),
            Self::Empty => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<l7:Bundle xmlns:l7="http://ns.l7tech.com/2010/04/gateway-management">
  <l7:References>
    <l7:Item>
      <l7:Name>orders-fragment</l7:Name>
      <l7:Id>f1</l7:Id>
      <l7:Type>POLICY</l7:Type>
      <l7:Resource>
        <l7:Policy guid="g-1" id="f1">
          <l7:PolicyDetail folderId="root" guid="g-1" id="f1">
            <l7:Name>orders-fragment</l7:Name>
            <l7:PolicyType>Include</l7:PolicyType>
          </l7:PolicyDetail>
          <l7:Resources>
            <l7:ResourceSet tag="policy">
              <l7:Resource type="policy">&lt;wsp:Policy/&gt;</l7:Resource>
            </l7:ResourceSet>
          </l7:Resources>
        </l7:Policy>
      </l7:Resource>
    </l7:Item>
    <l7:Item>
      <l7:Name>orders</l7:Name>
      <l7:Id>s1</l7:Id>
      <l7:Type>SERVICE</l7:Type>
      <l7:Resource>
        <l7:Service id="s1">
          <l7:ServiceDetail id="s1">
            <l7:Name>orders</l7:Name>
            <l7:Enabled>true</l7:Enabled>
            <l7:ServiceMappings>
              <l7:HttpMapping>
                <l7:UrlPattern>/orders*</l7:UrlPattern>
                <l7:Verbs><l7:Verb>GET</l7:Verb><l7:Verb>BREW</l7:Verb></l7:Verbs>
              </l7:HttpMapping>
            </l7:ServiceMappings>
            <l7:Properties>
              <l7:Property key="property.tier"><l7:StringValue>gold</l7:StringValue></l7:Property>
              <l7:Property key="soap"><l7:BooleanValue>false</l7:BooleanValue></l7:Property>
              <l7:Property key="property.unset"/>
            </l7:Properties>
          </l7:ServiceDetail>
          <l7:Resources>
            <l7:ResourceSet tag="policy">
              <l7:Resource type="policy"><![CDATA[<wsp:Policy/>]]></l7:Resource>
            </l7:ResourceSet>
          </l7:Resources>
        </l7:Service>
      </l7:Resource>
    </l7:Item>
    <l7:Item>
      <l7:Name>cert</l7:Name>
      <l7:Id>c1</l7:Id>
      <l7:Type>TRUSTED_CERT</l7:Type>
    </l7:Item>
  </l7:References>
  <l7:Mappings>
    <l7:Mapping action="NewOrUpdate" srcId="f1" type="POLICY"/>
    <l7:Mapping srcId="s1" type="SERVICE"/>
  </l7:Mappings>
</l7:Bundle>"#;

    #[test]
    fn parses_items_in_order() {
        let bundle = parse(BUNDLE).unwrap();
        assert_eq!(bundle.items.len(), 3);

        let Resource::Policy(ref policy) = bundle.items[0].resource else {
            panic!("expected a policy item");
        };
        assert_eq!(policy.guid, "g-1");
        assert_eq!(policy.policy_type, INCLUDE);
        assert_eq!(policy.policy, "<wsp:Policy/>");

        let Resource::Service(ref service) = bundle.items[1].resource else {
            panic!("expected a service item");
        };
        assert!(service.enabled);
        assert_eq!(service.url_pattern, "/orders*");
        assert_eq!(service.verbs, vec!["GET", "BREW"]);
        assert_eq!(service.policy, "<wsp:Policy/>");
        assert_eq!(service.wsdl, None);
        assert_eq!(
            service.properties,
            vec![
                Property {
                    key: "property.tier".into(),
                    value: PropertyValue::String("gold".into()),
                },
                Property {
                    key: "soap".into(),
                    value: PropertyValue::Boolean(false),
                },
                Property {
                    key: "property.unset".into(),
                    value: PropertyValue::Empty,
                },
            ]
        );

        assert_eq!(
            bundle.items[2].resource,
            Resource::Unknown("TRUSTED_CERT".into())
        );
    }

    #[test]
    fn mapping_action_defaults() {
        let bundle = parse(BUNDLE).unwrap();
        assert_eq!(
            bundle.mappings,
            vec![
                Mapping {
                    action: NEW_OR_UPDATE.into(),
                    src_id: "f1".into(),
                    kind: POLICY.into(),
                },
                Mapping {
                    action: NEW_OR_UPDATE.into(),
                    src_id: "s1".into(),
                    kind: SERVICE.into(),
                },
            ]
        );
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(matches!(
            parse("<l7:Bundle><l7:References>"),
            Err(Error::Unclosed(_) | Error::Xml(_))
        ));
        assert!(matches!(
            parse("<Bundle><References></Bundle>"),
            Err(Error::Xml(_))
        ));
        assert!(matches!(parse(""), Err(Error::Empty)));
        assert!(matches!(parse("<Other/>"), Err(Error::NotABundle(_))));
    }

    #[test]
    fn service_item_without_service_is_an_error() {
        let xml = "<Bundle><References><Item><Name>x</Name><Type>SERVICE</Type></Item></References></Bundle>";
        assert!(matches!(
            parse(xml),
            Err(Error::Missing {
                element: "Service",
                ..
            })
        ));
    }
}
