//! Introspection tree and XML parser.
//!
//! The tree (`Node` → `Interface` → `Method`/`Property`, `Method` → in/out
//! `Argument`s) is built by a five-level state machine driven from a
//! `quick_xml::Reader` pulling one `Event` at a time. It tolerates
//! malformed elements: one missing a required attribute simply never
//! advances the state, so its children (if any) are skipped as
//! unrecognized rather than aborting the whole parse.

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub name: String,
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub name: String,
    pub in_args: Vec<Argument>,
    pub out_args: Vec<Argument>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub ty: String,
    pub writable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Interface {
    pub name: String,
    pub methods: Vec<Method>,
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Node {
    pub interfaces: Vec<Interface>,
}

impl Node {
    pub fn find_method(&self, interface_name: &str, method_name: &str) -> Option<&Method> {
        self.interfaces
            .iter()
            .find(|i| i.name == interface_name)?
            .methods
            .iter()
            .find(|m| m.name == method_name)
    }
}

#[derive(Debug, Error)]
pub enum IntrospectError {
    #[error("ill-formed XML: {0}")]
    IllFormed(#[from] quick_xml::Error),
    #[error("ill-formed XML: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Level {
    Root,
    Node,
    Interface,
    Method,
    Argument,
    Property,
}

fn attr(e: &quick_xml::events::BytesStart, name: &str) -> Result<Option<String>, IntrospectError> {
    for a in e.attributes().flatten() {
        if a.key.as_ref() == name.as_bytes() {
            return Ok(Some(a.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Applies one opening tag to the tree, returning the level it transitions
/// to. A tag that doesn't match what's expected at the current level (a
/// missing required attribute, an unrecognized name) leaves `level`
/// unchanged — the whole subtree under it is then treated as unrecognized.
fn start_element(
    node: &mut Node,
    level: Level,
    name: &str,
    e: &quick_xml::events::BytesStart,
) -> Result<Level, IntrospectError> {
    Ok(match level {
        Level::Root => {
            if name == "node" {
                Level::Node
            } else {
                level
            }
        }
        Level::Node => {
            if name == "interface" {
                match attr(e, "name")? {
                    Some(iface_name) => {
                        node.interfaces.push(Interface {
                            name: iface_name,
                            ..Default::default()
                        });
                        Level::Interface
                    }
                    None => level,
                }
            } else {
                level
            }
        }
        Level::Interface => {
            let iface = node
                .interfaces
                .last_mut()
                .expect("Interface level implies a pushed interface");
            if name == "method" {
                match attr(e, "name")? {
                    Some(method_name) => {
                        iface.methods.push(Method {
                            name: method_name,
                            in_args: Vec::new(),
                            out_args: Vec::new(),
                        });
                        Level::Method
                    }
                    None => level,
                }
            } else if name == "property" {
                let prop_name = attr(e, "name")?;
                let prop_type = attr(e, "type")?;
                let prop_access = attr(e, "access")?;
                match (prop_name, prop_type, prop_access) {
                    (Some(n), Some(t), Some(a)) => {
                        iface.properties.push(Property {
                            name: n,
                            ty: t,
                            writable: a == "readwrite",
                        });
                        Level::Property
                    }
                    _ => level,
                }
            } else {
                level
            }
        }
        Level::Method => {
            let iface = node
                .interfaces
                .last_mut()
                .expect("Method level implies a pushed interface");
            let method = iface
                .methods
                .last_mut()
                .expect("Method level implies a pushed method");
            if name != "arg" {
                return Ok(level);
            }
            let arg_type = attr(e, "type")?;
            let arg_name = attr(e, "name")?;
            let direction = attr(e, "direction")?.unwrap_or_else(|| "in".to_string());
            let ty = match arg_type {
                Some(ty) => ty,
                None => return Ok(level),
            };
            let is_in = match direction.as_str() {
                "in" => true,
                "out" => false,
                // An unrecognized direction is treated like a malformed
                // element: skip it.
                _ => return Ok(level),
            };
            let index = if is_in {
                method.in_args.len()
            } else {
                method.out_args.len()
            };
            let arg = Argument {
                name: arg_name.unwrap_or_else(|| format!("arg{index}")),
                ty,
            };
            if is_in {
                method.in_args.push(arg);
            } else {
                method.out_args.push(arg);
            }
            Level::Argument
        }
        Level::Argument | Level::Property => {
            // Unknown nested elements at these levels are ignored; there
            // is nothing to recurse into.
            level
        }
    })
}

fn end_element(level: Level, name: &str) -> Level {
    match (level, name) {
        (Level::Node, "node") => Level::Root,
        (Level::Interface, "interface") => Level::Node,
        (Level::Method, "method") => Level::Interface,
        (Level::Argument, "arg") => Level::Method,
        (Level::Property, "property") => Level::Interface,
        (other, _) => other,
    }
}

/// Parses the XML returned by `Introspectable.Introspect` into a [`Node`].
/// Unknown elements and attributes are ignored; a `method` without a
/// `name`, an `arg` without a `type`, or a `property` missing any of
/// {name, type, access} is skipped silently rather than failing the parse.
/// Parsing fails only when the XML itself is ill-formed.
pub fn parse(xml: &str) -> Result<Node, IntrospectError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut node = Node::default();
    let mut level = Level::Root;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                level = start_element(&mut node, level, &name, &e)?;
            }
            Event::Empty(e) => {
                // Self-closing: apply the same transition, but it never
                // has children, so don't leave `level` pointing at it.
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                start_element(&mut node, level, &name, &e)?;
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                level = end_element(level, &name);
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(node)
}
