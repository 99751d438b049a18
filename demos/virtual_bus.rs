//! A TV and a player on an in-memory CEC bus.
//!
//! `RUST_LOG=cec_core=trace cargo run --example virtual_bus`

use cec_core::*;
use std::io;
use std::sync::{mpsc, Arc, Mutex};
use tracing::info;

#[derive(Default)]
struct Node {
    handle: Option<BusHandle>,
    addrs: Vec<u8>,
}

/// Every adapter hears every frame. A frame is acknowledged
/// if any other adapter holds its destination.
#[derive(Default)]
struct Wire {
    nodes: Mutex<Vec<Node>>,
}

impl Wire {
    fn run(&self, rx: mpsc::Receiver<(usize, CecMsg)>) {
        for (from, msg) in rx {
            let dest = msg.msg[0] & 0xf;
            let (sender, others, acked) = {
                let nodes = self.nodes.lock().unwrap();
                let acked = dest == 0xf
                    || nodes
                        .iter()
                        .enumerate()
                        .any(|(i, n)| i != from && n.addrs.contains(&dest));
                let others: Vec<BusHandle> = nodes
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != from)
                    .filter_map(|(_, n)| n.handle.clone())
                    .collect();
                (nodes[from].handle.clone(), others, acked)
            };
            if let Some(sender) = sender {
                sender.transmit_done(if acked {
                    TxStatus::OK
                } else {
                    TxStatus::RETRY_TIMEOUT
                });
            }
            for h in others {
                h.received(&msg);
            }
        }
    }
}

struct Port {
    id: usize,
    wire: Arc<Wire>,
    tx: Mutex<mpsc::Sender<(usize, CecMsg)>>,
}

impl CecHardware for Port {
    fn enable(&self, on: bool) -> io::Result<()> {
        if !on {
            self.wire.nodes.lock().unwrap()[self.id].addrs.clear();
        }
        Ok(())
    }
    fn claim_logical_address(&self, log_addr: u8) -> io::Result<()> {
        self.wire.nodes.lock().unwrap()[self.id].addrs.push(log_addr);
        Ok(())
    }
    fn begin_transmit(&self, msg: &CecMsg) -> io::Result<()> {
        self.tx
            .lock()
            .unwrap()
            .send((self.id, msg.clone()))
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }
    fn cancel_transmit(&self) {}
}

fn attach(
    wire: &Arc<Wire>,
    tx: &mpsc::Sender<(usize, CecMsg)>,
    config: AdapterConfig,
) -> Result<CecAdapter> {
    let id = {
        let mut nodes = wire.nodes.lock().unwrap();
        nodes.push(Node::default());
        nodes.len() - 1
    };
    let port = Port {
        id,
        wire: wire.clone(),
        tx: Mutex::new(tx.clone()),
    };
    let cec = CecAdapter::new(config.with_capabilities(Capabilities::all()), port)?;
    wire.nodes.lock().unwrap()[id].handle = Some(cec.bus_handle());
    cec.set_enabled(true)?;
    Ok(cec)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let wire = Arc::new(Wire::default());
    let (tx, rx) = mpsc::channel();
    {
        let wire = wire.clone();
        std::thread::spawn(move || wire.run(rx));
    }

    let tv = attach(&wire, &tx, AdapterConfig::new("tv").with_sink(true))?;
    tv.set_phys(0x0000)?;
    tv.set_log(
        CecLogAddrs::single(CecLogAddrType::TV, CecPrimDevType::TV).with_osd_name("TV")?,
    )?;

    let player = attach(&wire, &tx, AdapterConfig::new("player"))?;
    player.set_phys(0x1000)?;
    let log = player.set_log(
        CecLogAddrs::single(CecLogAddrType::PLAYBACK, CecPrimDevType::PLAYBACK)
            .with_osd_name("demo")?,
    )?;
    let me = log.addresses()[0];
    info!(addr = ?me, "player configured");

    let version = player.request_data(
        me,
        CecLogicalAddress::Tv,
        CecOpcode::GetCecVersion,
        &[],
        CecOpcode::CecVersion,
    )?;
    info!(version = ?Version::try_from(version[0]), "TV speaks");

    let name = tv.request_data(
        CecLogicalAddress::Tv,
        me,
        CecOpcode::GiveOsdName,
        &[],
        CecOpcode::SetOsdName,
    )?;
    info!(name = %OSDStr::<14>::from(name.as_slice()), "player is called");

    player.turn_on(me, CecLogicalAddress::Tv)?;
    loop {
        let msg = tv.rec_for(500)?;
        if msg.opcode_raw() == Some(CecOpcode::ImageViewOn.into()) {
            info!(from = ?msg.initiator(), "TV was asked to turn on");
            break;
        }
    }
    Ok(())
}
