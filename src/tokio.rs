//! Use a [CecAdapter] from async code.
//!
//! Blocking calls run on tokio's blocking thread pool.

use crate::{
    CecAdapter, CecCaps, CecError, CecEvent, CecLogAddrs, CecLogicalAddress, CecMsg, CecOpcode,
    CecPhysicalAddress, Result,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AsyncCec(Arc<CecAdapter>);

impl AsyncCec {
    pub fn new(adapter: CecAdapter) -> Self {
        Self(Arc::new(adapter))
    }
    /// The synchronous adapter
    pub fn adapter(&self) -> &CecAdapter {
        &self.0
    }
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&CecAdapter) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let adapter = self.0.clone();
        ::tokio::task::spawn_blocking(move || f(&adapter))
            .await
            .map_err(|e| CecError::Io(std::io::Error::other(e)))?
    }
    pub async fn rec(&self) -> Result<CecMsg> {
        self.blocking(|cec| cec.rec()).await
    }
    pub async fn rec_for(&self, timeout: u32) -> Result<CecMsg> {
        self.blocking(move |cec| cec.rec_for(timeout)).await
    }
    /// Queue `msg` and wait for it to complete. See [CecAdapter::transmit]
    pub async fn transmit(&self, msg: CecMsg) -> Result<CecMsg> {
        self.blocking(move |cec| cec.transmit(msg, true)).await
    }
    pub async fn transmit_opcode(
        &self,
        from: CecLogicalAddress,
        to: CecLogicalAddress,
        opcode: CecOpcode,
    ) -> Result<()> {
        self.blocking(move |cec| cec.transmit_opcode(from, to, opcode))
            .await
    }
    pub async fn transmit_data(
        &self,
        from: CecLogicalAddress,
        to: CecLogicalAddress,
        opcode: CecOpcode,
        data: &[u8],
    ) -> Result<()> {
        let data = data.to_vec();
        self.blocking(move |cec| cec.transmit_data(from, to, opcode, &data))
            .await
    }
    pub async fn request_data(
        &self,
        from: CecLogicalAddress,
        to: CecLogicalAddress,
        opcode: CecOpcode,
        data: &[u8],
        wait_for: CecOpcode,
    ) -> Result<Vec<u8>> {
        let data = data.to_vec();
        self.blocking(move |cec| cec.request_data(from, to, opcode, &data, wait_for))
            .await
    }
    /// Claim logical addresses. See [CecAdapter::set_log]
    pub async fn set_log(&self, log: CecLogAddrs) -> Result<CecLogAddrs> {
        self.blocking(move |cec| cec.set_log(log)).await
    }
    pub fn get_event(&self) -> Result<CecEvent> {
        self.0.get_event()
    }
    pub fn get_capas(&self) -> CecCaps {
        self.0.get_capas()
    }
    pub fn get_log(&self) -> CecLogAddrs {
        self.0.get_log()
    }
    pub fn get_phys(&self) -> CecPhysicalAddress {
        self.0.get_phys()
    }
    pub fn set_phys(&self, addr: CecPhysicalAddress) -> Result<()> {
        self.0.set_phys(addr)
    }
}
