//! Read-only flattened device tree access
//!
//! Just enough of the FDT format to walk a FIT: header checks, node lookup
//! by path, and property access. Everything is bounds-checked; a malformed
//! structure block ends iteration instead of panicking.
//!
//! ```text
//!   header (40 bytes, big-endian)
//!   ├── off_dt_struct ──► BEGIN_NODE "" props... BEGIN_NODE "images" ... END_NODE END
//!   └── off_dt_strings ─► "description\0default\0data\0..."
//! ```

pub const FDT_MAGIC: u32 = 0xd00d_feed;
pub const FDT_HEADER_SIZE: usize = 40;

const FDT_BEGIN_NODE: u32 = 0x0000_0001;
const FDT_END_NODE: u32 = 0x0000_0002;
const FDT_PROP: u32 = 0x0000_0003;
const FDT_NOP: u32 = 0x0000_0004;
const FDT_END: u32 = 0x0000_0009;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdtError {
    /// Magic number does not match
    BadMagic,
    /// Header offsets or sizes point outside the blob
    BadHeader,
    /// Blob is shorter than its header says
    Truncated,
}

fn be32(data: &[u8], off: usize) -> Option<u32> {
    let b = data.get(off..off.checked_add(4)?)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

const fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Magic number at the start of `buf`, if there are enough bytes
pub fn magic(buf: &[u8]) -> Option<u32> {
    be32(buf, 0)
}

/// Total size recorded in the header at the start of `buf`
pub fn totalsize(buf: &[u8]) -> Option<u32> {
    be32(buf, 4)
}

/// A validated device tree blob
#[derive(Debug, Clone, Copy)]
pub struct Fdt<'a> {
    data: &'a [u8],
    structs: &'a [u8],
    /// Offset of the struct block within `data`
    struct_base: usize,
    strings: &'a [u8],
}

impl<'a> Fdt<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, FdtError> {
        if magic(data) != Some(FDT_MAGIC) {
            return Err(FdtError::BadMagic);
        }
        if data.len() < FDT_HEADER_SIZE {
            return Err(FdtError::Truncated);
        }

        let field = |n: usize| be32(data, n * 4).map(|v| v as usize).ok_or(FdtError::BadHeader);
        let total = field(1)?;
        let off_struct = field(2)?;
        let off_strings = field(3)?;
        let size_strings = field(8)?;
        let size_struct = field(9)?;

        if total < FDT_HEADER_SIZE {
            return Err(FdtError::BadHeader);
        }
        if total > data.len() {
            return Err(FdtError::Truncated);
        }
        let data = &data[..total];

        let block = |off: usize, size: usize| {
            off.checked_add(size)
                .and_then(|end| data.get(off..end))
                .ok_or(FdtError::BadHeader)
        };
        let structs = block(off_struct, size_struct)?;
        let strings = block(off_strings, size_strings)?;

        Ok(Self {
            data,
            structs,
            struct_base: off_struct,
            strings,
        })
    }

    pub fn totalsize(&self) -> usize {
        self.data.len()
    }

    /// Root node, `None` if the struct block does not start with one
    pub fn root(&self) -> Option<Node<'a>> {
        let mut pos = 0;
        loop {
            match be32(self.structs, pos)? {
                FDT_NOP => pos += 4,
                FDT_BEGIN_NODE => {
                    let (name, body) = self.node_name(pos + 4)?;
                    return Some(Node {
                        fdt: *self,
                        name,
                        body,
                    });
                }
                _ => return None,
            }
        }
    }

    /// Look up a node by absolute path, e.g. `/images/firmware-1`
    pub fn find_node(&self, path: &str) -> Option<Node<'a>> {
        path.split('/')
            .filter(|c| !c.is_empty())
            .try_fold(self.root()?, |node, name| node.subnode(name))
    }

    fn node_name(&self, pos: usize) -> Option<(&'a str, usize)> {
        let rest = self.structs.get(pos..)?;
        let len = rest.iter().position(|&b| b == 0)?;
        let name = core::str::from_utf8(&rest[..len]).ok()?;
        Some((name, align4(pos + len + 1)))
    }

    fn string_at(&self, off: usize) -> Option<&'a str> {
        let rest = self.strings.get(off..)?;
        let len = rest.iter().position(|&b| b == 0)?;
        core::str::from_utf8(&rest[..len]).ok()
    }
}

/// A property value, with its position in the blob
#[derive(Debug, Clone, Copy)]
pub struct Property<'a> {
    pub name: &'a str,
    pub value: &'a [u8],
    /// Offset of `value` from the start of the blob
    pub offset: usize,
}

impl<'a> Property<'a> {
    pub fn as_u32(&self) -> Option<u32> {
        if self.value.len() != 4 {
            return None;
        }
        be32(self.value, 0)
    }

    /// First string of the value
    pub fn as_str(&self) -> Option<&'a str> {
        self.strings().next()
    }

    /// NUL-separated string list
    pub fn strings(&self) -> impl Iterator<Item = &'a str> {
        let value = self.value;
        value
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .filter_map(|s| core::str::from_utf8(s).ok())
    }
}

/// A node in the tree
#[derive(Debug, Clone, Copy)]
pub struct Node<'a> {
    fdt: Fdt<'a>,
    name: &'a str,
    /// Struct-block offset of the first token after the node name
    body: usize,
}

enum Item<'a> {
    Prop(Property<'a>),
    Child(Node<'a>),
}

/// Walks the direct properties and children of a node
struct Items<'a> {
    fdt: Fdt<'a>,
    pos: usize,
    depth: usize,
    done: bool,
}

impl<'a> Items<'a> {
    fn step(&mut self) -> Option<Item<'a>> {
        let s = self.fdt.structs;
        loop {
            let token = be32(s, self.pos)?;
            self.pos += 4;
            match token {
                FDT_NOP => {}
                FDT_PROP => {
                    let len = be32(s, self.pos)? as usize;
                    let nameoff = be32(s, self.pos + 4)? as usize;
                    let start = self.pos + 8;
                    let value = s.get(start..start.checked_add(len)?)?;
                    self.pos = align4(start + len);
                    if self.depth == 0 {
                        return Some(Item::Prop(Property {
                            name: self.fdt.string_at(nameoff)?,
                            value,
                            offset: self.fdt.struct_base + start,
                        }));
                    }
                }
                FDT_BEGIN_NODE => {
                    let (name, body) = self.fdt.node_name(self.pos)?;
                    self.pos = body;
                    self.depth += 1;
                    if self.depth == 1 {
                        return Some(Item::Child(Node {
                            fdt: self.fdt,
                            name,
                            body,
                        }));
                    }
                }
                FDT_END_NODE => {
                    if self.depth == 0 {
                        return None;
                    }
                    self.depth -= 1;
                }
                FDT_END => return None,
                _ => return None,
            }
        }
    }
}

impl<'a> Iterator for Items<'a> {
    type Item = Item<'a>;

    fn next(&mut self) -> Option<Item<'a>> {
        if self.done {
            return None;
        }
        let item = self.step();
        self.done = item.is_none();
        item
    }
}

impl<'a> Node<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    fn items(&self) -> Items<'a> {
        Items {
            fdt: self.fdt,
            pos: self.body,
            depth: 0,
            done: false,
        }
    }

    pub fn properties(&self) -> impl Iterator<Item = Property<'a>> {
        self.items().filter_map(|i| match i {
            Item::Prop(p) => Some(p),
            Item::Child(_) => None,
        })
    }

    pub fn children(&self) -> impl Iterator<Item = Node<'a>> {
        self.items().filter_map(|i| match i {
            Item::Child(n) => Some(n),
            Item::Prop(_) => None,
        })
    }

    pub fn property(&self, name: &str) -> Option<Property<'a>> {
        self.properties().find(|p| p.name == name)
    }

    pub fn subnode(&self, name: &str) -> Option<Node<'a>> {
        self.children().find(|n| n.name == name)
    }

    pub fn prop_u32(&self, name: &str) -> Option<u32> {
        self.property(name)?.as_u32()
    }

    pub fn prop_str(&self, name: &str) -> Option<&'a str> {
        self.property(name)?.as_str()
    }
}
