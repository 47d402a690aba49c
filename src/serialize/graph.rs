//! `.hgr` codec: the compiled graph format (§4.10).

use crate::error::{HarmonicsError, Result};
use crate::ir::{Arrow, CycleLine, Graph, NodeDecl, NodeKind, NodeRef, RatioWidth};
use crate::serialize::{read_framed, write_framed, Reader};

const MAGIC: &[u8; 4] = b"HGR1";
const VERSION: u32 = 1;

pub fn encode(g: &Graph) -> Vec<u8> {
    let mut out = Vec::new();
    write_framed(&mut out, MAGIC, VERSION, &encode_body(g)).expect("writing to Vec never fails");
    out
}

pub fn decode(bytes: &[u8]) -> Result<Graph> {
    let (version, body) = read_framed(bytes, MAGIC)?;
    if version != VERSION {
        return Err(HarmonicsError::Serialization(format!(
            "unsupported .hgr version {}",
            version
        )));
    }
    decode_body(&body)
}

/// The canonical body encoding, also used (without the magic/version
/// header) as the graph digest's input (§4.10: digest is stable under
/// save/load).
pub fn encode_body(g: &Graph) -> Vec<u8> {
    use crate::serialize::{write_u64, write_u8};

    let mut out = Vec::new();
    write_node_decls(&mut out, &g.producers);
    write_node_decls(&mut out, &g.consumers);
    write_node_decls(&mut out, &g.layers);

    write_u64(&mut out, g.cycle.len() as u64);
    for line in &g.cycle {
        write_node_ref(&mut out, line.source);
        write_u64(&mut out, line.arrows.len() as u64);
        for arrow in &line.arrows {
            write_arrow(&mut out, arrow);
        }
        match &line.gate {
            Some((node, want)) => {
                write_u8(&mut out, 1);
                write_node_ref(&mut out, *node);
                write_u8(&mut out, *want as u8);
            }
            None => write_u8(&mut out, 0),
        }
    }

    out
}

fn write_node_decls(out: &mut Vec<u8>, decls: &[NodeDecl]) {
    use crate::serialize::{write_str, write_u64, write_u8};
    write_u64(out, decls.len() as u64);
    for d in decls {
        write_str(out, &d.name);
        match d.declared_width {
            Some(w) => {
                write_u8(out, 1);
                write_u64(out, w);
            }
            None => write_u8(out, 0),
        }
        match &d.ratio {
            Some(r) => {
                write_u8(out, 1);
                write_u64(out, r.lhs);
                write_u64(out, r.rhs);
                write_str(out, &r.ref_name);
            }
            None => write_u8(out, 0),
        }
        match d.resolved_width {
            Some(w) => {
                write_u8(out, 1);
                write_u64(out, w);
            }
            None => write_u8(out, 0),
        }
    }
}

fn write_node_ref(out: &mut Vec<u8>, node: NodeRef) {
    use crate::serialize::{write_u64, write_u8};
    let kind_tag = match node.kind {
        NodeKind::Producer => 0,
        NodeKind::Consumer => 1,
        NodeKind::Layer => 2,
    };
    write_u8(out, kind_tag);
    write_u64(out, node.index as u64);
}

fn write_arrow(out: &mut Vec<u8>, arrow: &Arrow) {
    use crate::serialize::{write_str, write_u8};
    write_node_ref(out, arrow.target);
    write_u8(out, arrow.backward as u8);
    match &arrow.function {
        Some(f) => {
            write_u8(out, 1);
            write_str(out, f);
        }
        None => write_u8(out, 0),
    }
}

fn decode_body(body: &[u8]) -> Result<Graph> {
    let mut r = Reader::new(body);
    let producers = read_node_decls(&mut r)?;
    let consumers = read_node_decls(&mut r)?;
    let layers = read_node_decls(&mut r)?;

    let n_lines = r.read_u64().map_err(io_err)? as usize;
    let mut cycle = Vec::with_capacity(n_lines);
    for _ in 0..n_lines {
        let source = read_node_ref(&mut r)?;
        let n_arrows = r.read_u64().map_err(io_err)? as usize;
        let mut arrows = Vec::with_capacity(n_arrows);
        for _ in 0..n_arrows {
            arrows.push(read_arrow(&mut r)?);
        }
        let has_gate = r.read_u8().map_err(io_err)? != 0;
        let gate = if has_gate {
            let node = read_node_ref(&mut r)?;
            let want = r.read_u8().map_err(io_err)? != 0;
            Some((node, want))
        } else {
            None
        };
        cycle.push(CycleLine {
            source,
            arrows,
            gate,
        });
    }

    Ok(Graph::new(producers, consumers, layers, cycle))
}

fn read_node_decls(r: &mut Reader) -> Result<Vec<NodeDecl>> {
    let n = r.read_u64().map_err(io_err)? as usize;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let name = r.read_str().map_err(io_err)?;
        let declared_width = if r.read_u8().map_err(io_err)? != 0 {
            Some(r.read_u64().map_err(io_err)?)
        } else {
            None
        };
        let ratio = if r.read_u8().map_err(io_err)? != 0 {
            let lhs = r.read_u64().map_err(io_err)?;
            let rhs = r.read_u64().map_err(io_err)?;
            let ref_name = r.read_str().map_err(io_err)?;
            Some(RatioWidth { lhs, rhs, ref_name })
        } else {
            None
        };
        let resolved_width = if r.read_u8().map_err(io_err)? != 0 {
            Some(r.read_u64().map_err(io_err)?)
        } else {
            None
        };
        out.push(NodeDecl {
            name,
            declared_width,
            ratio,
            resolved_width,
        });
    }
    Ok(out)
}

fn read_node_ref(r: &mut Reader) -> Result<NodeRef> {
    let tag = r.read_u8().map_err(io_err)?;
    let index = r.read_u64().map_err(io_err)? as usize;
    let kind = match tag {
        0 => NodeKind::Producer,
        1 => NodeKind::Consumer,
        2 => NodeKind::Layer,
        other => {
            return Err(HarmonicsError::Serialization(format!(
                "bad node kind tag {}",
                other
            )))
        }
    };
    Ok(NodeRef { kind, index })
}

fn read_arrow(r: &mut Reader) -> Result<Arrow> {
    let target = read_node_ref(r)?;
    let backward = r.read_u8().map_err(io_err)? != 0;
    let function = if r.read_u8().map_err(io_err)? != 0 {
        Some(r.read_str().map_err(io_err)?)
    } else {
        None
    };
    Ok(Arrow {
        target,
        backward,
        function,
    })
}

fn io_err(e: std::io::Error) -> HarmonicsError {
    HarmonicsError::Serialization(e.to_string())
}
