//! High-level client dispatcher
//!
//! The client validates operation arguments, builds the request PDU, runs
//! it through the codec and transport, and validates the shape of the
//! decoded response before handing the payload back to the caller. Nothing
//! is retried; every failure surfaces unchanged.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::constants::*;
use crate::device_id::{BasicDeviceId, ExtendedDeviceId, ReadDeviceIdCode, RegularDeviceId};
use crate::error::{ModbusError, ModbusException, ModbusResult};
use crate::frame::FrameCodec;
use crate::pdu::{data_block, data_block_suffix, ModbusPdu};
use crate::transport::ModbusTransport;

#[inline]
fn be16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

/// Modbus client bound to one handler
///
/// The handler provides both the framing codec and the transport; the
/// client is what turns `read_holding_registers(0x006B, 3)` into bytes on
/// the wire and a validated payload back.
pub struct ModbusClient {
    codec: Arc<dyn FrameCodec>,
    transport: Arc<dyn ModbusTransport>,
}

impl ModbusClient {
    /// Create a client from a handler implementing both contracts
    pub fn new<H>(handler: Arc<H>) -> Self
    where
        H: FrameCodec + ModbusTransport + 'static,
    {
        Self {
            codec: handler.clone(),
            transport: handler,
        }
    }

    /// Create a client from an independent codec and transport
    pub fn from_parts(codec: Arc<dyn FrameCodec>, transport: Arc<dyn ModbusTransport>) -> Self {
        Self { codec, transport }
    }

    /// Encode, exchange, cross-check, decode, and inspect for exceptions
    async fn send_request(&self, request: &ModbusPdu) -> ModbusResult<ModbusPdu> {
        let request_adu = self.codec.encode(request)?;
        let response_adu = self.transport.send(&request_adu).await?;
        self.codec.verify(&request_adu, &response_adu)?;
        let response = self.codec.decode(&response_adu)?;

        if response.function_code != request.function_code {
            let exception_code = response.data.first().copied().unwrap_or(0);
            debug!(
                "exception response: fc={:02X} ec={:02X}",
                request.function_code, exception_code
            );
            return Err(ModbusException::new(request.function_code, exception_code).into());
        }
        if response.data.is_empty() {
            return Err(ModbusError::mismatch("response data is empty"));
        }
        Ok(response)
    }

    /// Shared path for the count-prefixed read responses
    async fn read_with_count(
        &self,
        function_code: u8,
        data: Vec<u8>,
    ) -> ModbusResult<Vec<u8>> {
        let request = ModbusPdu::new(function_code, data);
        let response = self.send_request(&request).await?;

        let count = usize::from(response.data[0]);
        let length = response.data.len() - 1;
        if count != length {
            return Err(ModbusError::mismatch(format!(
                "response data size '{length}' does not match count '{count}'"
            )));
        }
        Ok(response.data[1..].to_vec())
    }

    /// Read coils (0x01). Returns the packed coil status bytes.
    pub async fn read_coils(&self, address: u16, quantity: u16) -> ModbusResult<Vec<u8>> {
        if quantity < 1 || quantity > MAX_READ_COILS {
            return Err(ModbusError::invalid_argument(format!(
                "quantity '{quantity}' must be between '1' and '{MAX_READ_COILS}'"
            )));
        }
        self.read_with_count(FC_READ_COILS, data_block(&[address, quantity]))
            .await
    }

    /// Read discrete inputs (0x02). Returns the packed input status bytes.
    pub async fn read_discrete_inputs(
        &self,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u8>> {
        if quantity < 1 || quantity > MAX_READ_COILS {
            return Err(ModbusError::invalid_argument(format!(
                "quantity '{quantity}' must be between '1' and '{MAX_READ_COILS}'"
            )));
        }
        self.read_with_count(FC_READ_DISCRETE_INPUTS, data_block(&[address, quantity]))
            .await
    }

    /// Read holding registers (0x03). Returns the register bytes,
    /// big-endian, two per register.
    pub async fn read_holding_registers(
        &self,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u8>> {
        if quantity < 1 || quantity > MAX_READ_REGISTERS {
            return Err(ModbusError::invalid_argument(format!(
                "quantity '{quantity}' must be between '1' and '{MAX_READ_REGISTERS}'"
            )));
        }
        self.read_with_count(FC_READ_HOLDING_REGISTERS, data_block(&[address, quantity]))
            .await
    }

    /// Read input registers (0x04). Returns the register bytes, big-endian,
    /// two per register.
    pub async fn read_input_registers(
        &self,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u8>> {
        if quantity < 1 || quantity > MAX_READ_REGISTERS {
            return Err(ModbusError::invalid_argument(format!(
                "quantity '{quantity}' must be between '1' and '{MAX_READ_REGISTERS}'"
            )));
        }
        self.read_with_count(FC_READ_INPUT_REGISTERS, data_block(&[address, quantity]))
            .await
    }

    /// Write a single coil (0x05). `value` must be 0xFF00 (ON) or 0x0000
    /// (OFF). Returns the echoed value bytes.
    pub async fn write_single_coil(&self, address: u16, value: u16) -> ModbusResult<Vec<u8>> {
        if value != COIL_ON && value != COIL_OFF {
            return Err(ModbusError::invalid_argument(format!(
                "state '{value}' must be either 0xFF00 (ON) or 0x0000 (OFF)"
            )));
        }
        let request = ModbusPdu::new(FC_WRITE_SINGLE_COIL, data_block(&[address, value]));
        let response = self.send_request(&request).await?;
        Self::expect_echo(&response.data, &[("address", address), ("value", value)])?;
        Ok(response.data[2..].to_vec())
    }

    /// Write a single register (0x06). Returns the echoed value bytes.
    pub async fn write_single_register(&self, address: u16, value: u16) -> ModbusResult<Vec<u8>> {
        let request = ModbusPdu::new(FC_WRITE_SINGLE_REGISTER, data_block(&[address, value]));
        let response = self.send_request(&request).await?;
        Self::expect_echo(&response.data, &[("address", address), ("value", value)])?;
        Ok(response.data[2..].to_vec())
    }

    /// Write multiple coils (0x0F). `values` packs the coil states eight to
    /// a byte. Returns the echoed quantity bytes.
    pub async fn write_multiple_coils(
        &self,
        address: u16,
        quantity: u16,
        values: &[u8],
    ) -> ModbusResult<Vec<u8>> {
        if quantity < 1 || quantity > MAX_WRITE_COILS {
            return Err(ModbusError::invalid_argument(format!(
                "quantity '{quantity}' must be between '1' and '{MAX_WRITE_COILS}'"
            )));
        }
        let request = ModbusPdu::new(
            FC_WRITE_MULTIPLE_COILS,
            data_block_suffix(values, &[address, quantity]),
        );
        let response = self.send_request(&request).await?;
        Self::expect_echo(&response.data, &[("address", address), ("quantity", quantity)])?;
        Ok(response.data[2..].to_vec())
    }

    /// Write multiple registers (0x10). `values` carries two big-endian
    /// bytes per register. Returns the echoed quantity bytes.
    pub async fn write_multiple_registers(
        &self,
        address: u16,
        quantity: u16,
        values: &[u8],
    ) -> ModbusResult<Vec<u8>> {
        if quantity < 1 || quantity > MAX_WRITE_REGISTERS {
            return Err(ModbusError::invalid_argument(format!(
                "quantity '{quantity}' must be between '1' and '{MAX_WRITE_REGISTERS}'"
            )));
        }
        let request = ModbusPdu::new(
            FC_WRITE_MULTIPLE_REGISTERS,
            data_block_suffix(values, &[address, quantity]),
        );
        let response = self.send_request(&request).await?;
        Self::expect_echo(&response.data, &[("address", address), ("quantity", quantity)])?;
        Ok(response.data[2..].to_vec())
    }

    /// Mask write register (0x16). Applies
    /// `(current AND and_mask) OR (or_mask AND NOT and_mask)` on the
    /// server. Returns the echoed mask bytes.
    pub async fn mask_write_register(
        &self,
        address: u16,
        and_mask: u16,
        or_mask: u16,
    ) -> ModbusResult<Vec<u8>> {
        let request = ModbusPdu::new(
            FC_MASK_WRITE_REGISTER,
            data_block(&[address, and_mask, or_mask]),
        );
        let response = self.send_request(&request).await?;
        Self::expect_echo(
            &response.data,
            &[
                ("address", address),
                ("AND-mask", and_mask),
                ("OR-mask", or_mask),
            ],
        )?;
        Ok(response.data[2..].to_vec())
    }

    /// Read/write multiple registers in one transaction (0x17). Returns the
    /// read register bytes.
    pub async fn read_write_multiple_registers(
        &self,
        read_address: u16,
        read_quantity: u16,
        write_address: u16,
        write_quantity: u16,
        values: &[u8],
    ) -> ModbusResult<Vec<u8>> {
        if read_quantity < 1 || read_quantity > MAX_READ_REGISTERS {
            return Err(ModbusError::invalid_argument(format!(
                "quantity to read '{read_quantity}' must be between '1' and '{MAX_READ_REGISTERS}'"
            )));
        }
        if write_quantity < 1 || write_quantity > MAX_READ_WRITE_REGISTERS {
            return Err(ModbusError::invalid_argument(format!(
                "quantity to write '{write_quantity}' must be between '1' and '{MAX_READ_WRITE_REGISTERS}'"
            )));
        }
        self.read_with_count(
            FC_READ_WRITE_MULTIPLE_REGISTERS,
            data_block_suffix(
                values,
                &[read_address, read_quantity, write_address, write_quantity],
            ),
        )
        .await
    }

    /// Read the FIFO queue at `address` (0x18). Returns the queued register
    /// bytes after the count header.
    pub async fn read_fifo_queue(&self, address: u16) -> ModbusResult<Vec<u8>> {
        let request = ModbusPdu::new(FC_READ_FIFO_QUEUE, data_block(&[address]));
        let response = self.send_request(&request).await?;
        let data = &response.data;

        if data.len() < 4 {
            return Err(ModbusError::mismatch(format!(
                "response data size '{}' is less than expected '4'",
                data.len()
            )));
        }
        // The byte count covers the FIFO count field and the queued values
        let byte_count = usize::from(be16(data, 0));
        if byte_count != data.len() - 2 {
            return Err(ModbusError::mismatch(format!(
                "response data size '{}' does not match count '{byte_count}'",
                data.len() - 2
            )));
        }
        let fifo_count = be16(data, 2);
        if fifo_count > MAX_FIFO_COUNT {
            return Err(ModbusError::mismatch(format!(
                "fifo count '{fifo_count}' is greater than expected '{MAX_FIFO_COUNT}'"
            )));
        }
        Ok(data[4..].to_vec())
    }

    /// Write one file record (0x15). `values` holds the registers of the
    /// record; its length is the record length sent to the server.
    pub async fn write_file_record(
        &self,
        file_number: u16,
        record_number: u16,
        values: &[u16],
    ) -> ModbusResult<()> {
        if file_number == 0x0000 {
            return Err(ModbusError::invalid_argument(format!(
                "invalid file number: {file_number}"
            )));
        }
        if record_number > MAX_FILE_RECORD_NUMBER {
            return Err(ModbusError::invalid_argument(format!(
                "invalid record number: {record_number}"
            )));
        }
        if values.len() > usize::from(MAX_FILE_RECORD_LENGTH) {
            return Err(ModbusError::invalid_argument(format!(
                "invalid record count: {}",
                values.len()
            )));
        }
        let count = values.len() as u16;

        // Sub-request: reference type, file number, record number, record
        // length, then the record registers
        let mut data = vec![7 + 2 * count as u8, FILE_RECORD_REFERENCE_TYPE];
        data.extend_from_slice(&data_block(&[file_number, record_number, count]));
        data.extend_from_slice(&data_block(values));

        let request = ModbusPdu::new(FC_WRITE_FILE_RECORD, data);
        let response = self.send_request(&request).await?;
        let data = &response.data;

        if data.len() < 8 {
            return Err(ModbusError::mismatch(format!(
                "file record response size '{}' is too short",
                data.len()
            )));
        }
        if data[0] > 251 {
            return Err(ModbusError::mismatch(format!(
                "response size invalid: {}",
                data[0]
            )));
        }
        if data[1] != FILE_RECORD_REFERENCE_TYPE {
            return Err(ModbusError::mismatch(format!(
                "response reference type invalid: {}",
                data[1]
            )));
        }
        let response_file = be16(data, 2);
        if response_file != file_number {
            return Err(ModbusError::mismatch(format!(
                "response file number invalid: {response_file}"
            )));
        }
        let response_record = be16(data, 4);
        if response_record != record_number {
            return Err(ModbusError::mismatch(format!(
                "response record number invalid: {response_record}"
            )));
        }
        let response_length = be16(data, 6);
        if response_length != count {
            return Err(ModbusError::mismatch(format!(
                "response record length invalid: {response_length}"
            )));
        }

        let record_end = 8 + 2 * usize::from(response_length);
        let Some(record_bytes) = data.get(8..record_end) else {
            return Err(ModbusError::mismatch(
                "file record response data truncated",
            ));
        };
        // Record registers travel big-endian like every other register field
        let echoed = record_bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
        if echoed.ne(values.iter().copied()) {
            return Err(ModbusError::mismatch(
                "request and response file record does not match",
            ));
        }
        Ok(())
    }

    /// Stream the basic device identification objects (0x2B / MEI 0x0E)
    pub async fn read_device_identification_basic(&self) -> ModbusResult<BasicDeviceId> {
        let mut objects = self
            .read_device_identification(0x00, ReadDeviceIdCode::Basic)
            .await?;
        Ok(Self::basic_from_objects(&mut objects))
    }

    /// Stream the regular device identification objects
    pub async fn read_device_identification_regular(&self) -> ModbusResult<RegularDeviceId> {
        let mut objects = self
            .read_device_identification(0x00, ReadDeviceIdCode::Regular)
            .await?;
        Ok(Self::regular_from_objects(&mut objects))
    }

    /// Stream the extended device identification objects
    pub async fn read_device_identification_extended(&self) -> ModbusResult<ExtendedDeviceId> {
        let mut objects = self
            .read_device_identification(0x00, ReadDeviceIdCode::Extended)
            .await?;
        let regular = Self::regular_from_objects(&mut objects);
        // Whatever remains above the regular category is vendor-defined
        let extended_objects = objects
            .into_iter()
            .filter(|(id, _)| *id >= OBJECT_EXTENDED_BASE)
            .collect();
        Ok(ExtendedDeviceId {
            regular,
            extended_objects,
        })
    }

    /// Fetch one identification object by id
    pub async fn read_device_identification_specific(
        &self,
        object_id: u8,
    ) -> ModbusResult<Vec<u8>> {
        let mut objects = self
            .read_device_identification(object_id, ReadDeviceIdCode::Specific)
            .await?;
        objects.remove(&object_id).ok_or_else(|| {
            ModbusError::mismatch(format!(
                "device did not return object '{object_id:#04X}'"
            ))
        })
    }

    fn basic_from_objects(objects: &mut BTreeMap<u8, Vec<u8>>) -> BasicDeviceId {
        BasicDeviceId {
            vendor_name: objects.remove(&OBJECT_VENDOR_NAME).unwrap_or_default(),
            product_code: objects.remove(&OBJECT_PRODUCT_CODE).unwrap_or_default(),
            major_minor_revision: objects
                .remove(&OBJECT_MAJOR_MINOR_REVISION)
                .unwrap_or_default(),
        }
    }

    fn regular_from_objects(objects: &mut BTreeMap<u8, Vec<u8>>) -> RegularDeviceId {
        RegularDeviceId {
            basic: Self::basic_from_objects(objects),
            vendor_url: objects.remove(&OBJECT_VENDOR_URL).unwrap_or_default(),
            product_name: objects.remove(&OBJECT_PRODUCT_NAME).unwrap_or_default(),
            model_name: objects.remove(&OBJECT_MODEL_NAME).unwrap_or_default(),
            user_application_name: objects
                .remove(&OBJECT_USER_APPLICATION_NAME)
                .unwrap_or_default(),
        }
    }

    /// Request one identification stream and parse the object list
    async fn read_device_identification(
        &self,
        object_id: u8,
        read_code: ReadDeviceIdCode,
    ) -> ModbusResult<BTreeMap<u8, Vec<u8>>> {
        let request = ModbusPdu::new(
            FC_READ_DEVICE_IDENTIFICATION,
            vec![MEI_TYPE_DEVICE_IDENTIFICATION, read_code as u8, object_id],
        );
        let response = self.send_request(&request).await?;
        let data = &response.data;

        if data.len() < 6 {
            return Err(ModbusError::mismatch(format!(
                "device identification response size '{}' is too short",
                data.len()
            )));
        }
        if data[0] != MEI_TYPE_DEVICE_IDENTIFICATION {
            return Err(ModbusError::mismatch(format!(
                "response MEI type '{}' does not match request '{MEI_TYPE_DEVICE_IDENTIFICATION}'",
                data[0]
            )));
        }
        if data[1] != read_code as u8 {
            return Err(ModbusError::mismatch(format!(
                "response device id code '{}' does not match request '{}'",
                data[1], read_code as u8
            )));
        }
        let conformity_level = data[2];
        if conformity_level & 0x07 > 3 {
            return Err(ModbusError::mismatch(format!(
                "invalid response conformity level '{conformity_level}'"
            )));
        }
        let more_follows = data[3];
        if more_follows != 0x00 && more_follows != 0xFF {
            return Err(ModbusError::mismatch(format!(
                "invalid response more follows flag '{more_follows}'"
            )));
        }
        let next_object_id = data[4];
        let number_of_objects = data[5];
        if next_object_id != 0 {
            return Err(ModbusError::mismatch(format!(
                "multi-transaction responses are not supported, received first '{number_of_objects}' objects"
            )));
        }

        let mut objects = BTreeMap::new();
        let mut offset = 6;
        for _ in 0..number_of_objects {
            if data.len() < offset + 2 {
                return Err(ModbusError::mismatch(
                    "device identification object list truncated",
                ));
            }
            let id = data[offset];
            let length = usize::from(data[offset + 1]);
            offset += 2;
            let value_end = offset + length;
            let Some(value) = data.get(offset..value_end) else {
                return Err(ModbusError::mismatch(
                    "device identification object value truncated",
                ));
            };
            objects.insert(id, value.to_vec());
            offset = value_end;
        }
        Ok(objects)
    }

    /// Check a fixed-size echo response field by field
    fn expect_echo(data: &[u8], fields: &[(&str, u16)]) -> ModbusResult<()> {
        let expected_len = 2 * fields.len();
        if data.len() != expected_len {
            return Err(ModbusError::mismatch(format!(
                "response data size '{}' does not match expected '{expected_len}'",
                data.len()
            )));
        }
        for (index, (name, value)) in fields.iter().enumerate() {
            let echoed = be16(data, 2 * index);
            if echoed != *value {
                return Err(ModbusError::mismatch(format!(
                    "response {name} '{echoed}' does not match request '{value}'"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RtuCodec;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Codec that maps a PDU straight onto `[function code | data]` with no
    /// framing, so tests can script exact response PDUs
    struct RawCodec;

    impl FrameCodec for RawCodec {
        fn encode(&self, pdu: &ModbusPdu) -> ModbusResult<Vec<u8>> {
            let mut adu = Vec::with_capacity(pdu.len());
            adu.push(pdu.function_code);
            adu.extend_from_slice(&pdu.data);
            Ok(adu)
        }

        fn decode(&self, adu: &[u8]) -> ModbusResult<ModbusPdu> {
            if adu.is_empty() {
                return Err(ModbusError::frame("empty ADU"));
            }
            Ok(ModbusPdu::new(adu[0], adu[1..].to_vec()))
        }

        fn verify(&self, _request: &[u8], _response: &[u8]) -> ModbusResult<()> {
            Ok(())
        }
    }

    /// Transport that records requests and replays scripted responses
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Vec<u8>>>,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl ScriptedTransport {
        fn reply_with(replies: &[&[u8]]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|reply| reply.to_vec()).collect()),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent_frames(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModbusTransport for ScriptedTransport {
        async fn send(&self, request: &[u8]) -> ModbusResult<Vec<u8>> {
            self.sent.lock().unwrap().push(request.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ModbusError::connection("no scripted reply"))
        }

        async fn connect(&self) -> ModbusResult<()> {
            Ok(())
        }

        async fn close(&self) -> ModbusResult<()> {
            Ok(())
        }
    }

    fn raw_client(transport: Arc<ScriptedTransport>) -> ModbusClient {
        ModbusClient::from_parts(Arc::new(RawCodec), transport)
    }

    // ===== Count-prefixed reads =====

    #[tokio::test]
    async fn test_read_holding_registers_returns_payload_after_count() {
        let transport =
            ScriptedTransport::reply_with(&[&[0x03, 0x06, 0x02, 0x2B, 0x00, 0x00, 0x00, 0x64]]);
        let client = raw_client(transport.clone());

        let payload = client.read_holding_registers(0x006B, 3).await.unwrap();
        assert_eq!(payload, vec![0x02, 0x2B, 0x00, 0x00, 0x00, 0x64]);
        assert_eq!(
            transport.sent_frames(),
            vec![vec![0x03, 0x00, 0x6B, 0x00, 0x03]]
        );
    }

    #[tokio::test]
    async fn test_read_coils_count_must_match_payload() {
        let transport = ScriptedTransport::reply_with(&[&[0x01, 0x03, 0xCD, 0x6B]]);
        let client = raw_client(transport);
        let result = client.read_coils(0x0013, 19).await;
        assert!(matches!(result, Err(ModbusError::Mismatch(_))));
    }

    #[tokio::test]
    async fn test_read_quantity_bands_send_nothing() {
        let transport = ScriptedTransport::reply_with(&[]);
        let client = raw_client(transport.clone());

        assert!(matches!(
            client.read_coils(0, 0).await,
            Err(ModbusError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.read_coils(0, 2001).await,
            Err(ModbusError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.read_discrete_inputs(0, 2001).await,
            Err(ModbusError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.read_holding_registers(0, 126).await,
            Err(ModbusError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.read_input_registers(0, 0).await,
            Err(ModbusError::InvalidArgument(_))
        ));
        assert!(transport.sent_frames().is_empty());
    }

    // ===== Exception path =====

    #[tokio::test]
    async fn test_exception_response_carries_both_codes() {
        let transport = ScriptedTransport::reply_with(&[&[0x81, 0x02]]);
        let client = raw_client(transport);
        let result = client.read_coils(0x0000, 1).await;
        match result {
            Err(ModbusError::Exception(exception)) => {
                assert_eq!(exception.function_code, 0x01);
                assert_eq!(exception.exception_code, 0x02);
            }
            other => panic!("expected exception, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exception_without_payload_reports_code_zero() {
        let transport = ScriptedTransport::reply_with(&[&[0x83]]);
        let client = raw_client(transport);
        match client.read_holding_registers(0, 1).await {
            Err(ModbusError::Exception(exception)) => {
                assert_eq!(exception.exception_code, 0);
            }
            other => panic!("expected exception, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_response_data_is_rejected() {
        let transport = ScriptedTransport::reply_with(&[&[0x05]]);
        let client = raw_client(transport);
        let result = client.write_single_coil(0x0000, COIL_ON).await;
        assert!(matches!(result, Err(ModbusError::Mismatch(_))));
    }

    // ===== Echo-style writes =====

    #[tokio::test]
    async fn test_write_single_coil_validates_state_locally() {
        let transport = ScriptedTransport::reply_with(&[]);
        let client = raw_client(transport.clone());
        assert!(matches!(
            client.write_single_coil(0x00AC, 0x1234).await,
            Err(ModbusError::InvalidArgument(_))
        ));
        assert!(transport.sent_frames().is_empty());
    }

    #[tokio::test]
    async fn test_write_single_coil_accepts_exact_echo() {
        let transport = ScriptedTransport::reply_with(&[&[0x05, 0x00, 0xAC, 0xFF, 0x00]]);
        let client = raw_client(transport);
        let result = client.write_single_coil(0x00AC, COIL_ON).await.unwrap();
        assert_eq!(result, vec![0xFF, 0x00]);
    }

    #[tokio::test]
    async fn test_write_single_coil_rejects_flipped_echo() {
        // Address byte flipped
        let transport = ScriptedTransport::reply_with(&[&[0x05, 0x00, 0xAD, 0xFF, 0x00]]);
        let client = raw_client(transport);
        assert!(matches!(
            client.write_single_coil(0x00AC, COIL_ON).await,
            Err(ModbusError::Mismatch(_))
        ));

        // Value byte flipped
        let transport = ScriptedTransport::reply_with(&[&[0x05, 0x00, 0xAC, 0xFE, 0x00]]);
        let client = raw_client(transport);
        assert!(matches!(
            client.write_single_coil(0x00AC, COIL_ON).await,
            Err(ModbusError::Mismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_write_single_register_round_trip() {
        let transport = ScriptedTransport::reply_with(&[&[0x06, 0x00, 0x01, 0x00, 0x03]]);
        let client = raw_client(transport.clone());
        let result = client.write_single_register(0x0001, 0x0003).await.unwrap();
        assert_eq!(result, vec![0x00, 0x03]);
        assert_eq!(
            transport.sent_frames(),
            vec![vec![0x06, 0x00, 0x01, 0x00, 0x03]]
        );
    }

    #[tokio::test]
    async fn test_write_single_register_rejects_short_response() {
        let transport = ScriptedTransport::reply_with(&[&[0x06, 0x00, 0x01, 0x00]]);
        let client = raw_client(transport);
        assert!(matches!(
            client.write_single_register(0x0001, 0x0003).await,
            Err(ModbusError::Mismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_write_multiple_coils_echoes_address_and_quantity() {
        let transport = ScriptedTransport::reply_with(&[&[0x0F, 0x00, 0x13, 0x00, 0x0A]]);
        let client = raw_client(transport.clone());
        let result = client
            .write_multiple_coils(0x0013, 10, &[0xCD, 0x01])
            .await
            .unwrap();
        assert_eq!(result, vec![0x00, 0x0A]);
        assert_eq!(
            transport.sent_frames(),
            vec![vec![0x0F, 0x00, 0x13, 0x00, 0x0A, 0x02, 0xCD, 0x01]]
        );
    }

    #[tokio::test]
    async fn test_write_multiple_coils_quantity_band() {
        let transport = ScriptedTransport::reply_with(&[]);
        let client = raw_client(transport.clone());
        assert!(matches!(
            client.write_multiple_coils(0, 0, &[]).await,
            Err(ModbusError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.write_multiple_coils(0, 1969, &[0x00]).await,
            Err(ModbusError::InvalidArgument(_))
        ));
        assert!(transport.sent_frames().is_empty());
    }

    #[tokio::test]
    async fn test_write_multiple_registers_rejects_flipped_quantity() {
        let transport = ScriptedTransport::reply_with(&[&[0x10, 0x00, 0x01, 0x00, 0x03]]);
        let client = raw_client(transport);
        let result = client
            .write_multiple_registers(0x0001, 2, &[0x00, 0x0A, 0x01, 0x02])
            .await;
        assert!(matches!(result, Err(ModbusError::Mismatch(_))));
    }

    #[tokio::test]
    async fn test_write_multiple_registers_quantity_band() {
        let transport = ScriptedTransport::reply_with(&[]);
        let client = raw_client(transport.clone());
        assert!(matches!(
            client.write_multiple_registers(0, 124, &[]).await,
            Err(ModbusError::InvalidArgument(_))
        ));
        assert!(transport.sent_frames().is_empty());
    }

    #[tokio::test]
    async fn test_mask_write_register_echoes_all_three_fields() {
        let transport =
            ScriptedTransport::reply_with(&[&[0x16, 0x00, 0x04, 0x00, 0xF2, 0x00, 0x25]]);
        let client = raw_client(transport.clone());
        let result = client
            .mask_write_register(0x0004, 0x00F2, 0x0025)
            .await
            .unwrap();
        assert_eq!(result, vec![0x00, 0xF2, 0x00, 0x25]);
        assert_eq!(
            transport.sent_frames(),
            vec![vec![0x16, 0x00, 0x04, 0x00, 0xF2, 0x00, 0x25]]
        );
    }

    #[tokio::test]
    async fn test_mask_write_register_rejects_flipped_or_mask() {
        let transport =
            ScriptedTransport::reply_with(&[&[0x16, 0x00, 0x04, 0x00, 0xF2, 0x00, 0x26]]);
        let client = raw_client(transport);
        assert!(matches!(
            client.mask_write_register(0x0004, 0x00F2, 0x0025).await,
            Err(ModbusError::Mismatch(_))
        ));
    }

    // ===== Read/write multiple registers =====

    #[tokio::test]
    async fn test_read_write_multiple_registers_round_trip() {
        let transport =
            ScriptedTransport::reply_with(&[&[0x17, 0x04, 0x00, 0xFE, 0x0A, 0xCD]]);
        let client = raw_client(transport.clone());
        let result = client
            .read_write_multiple_registers(0x0003, 2, 0x000E, 1, &[0x00, 0xFF])
            .await
            .unwrap();
        assert_eq!(result, vec![0x00, 0xFE, 0x0A, 0xCD]);
        assert_eq!(
            transport.sent_frames(),
            vec![vec![
                0x17, 0x00, 0x03, 0x00, 0x02, 0x00, 0x0E, 0x00, 0x01, 0x02, 0x00, 0xFF
            ]]
        );
    }

    #[tokio::test]
    async fn test_read_write_multiple_registers_quantity_bands() {
        let transport = ScriptedTransport::reply_with(&[]);
        let client = raw_client(transport.clone());
        assert!(matches!(
            client
                .read_write_multiple_registers(0, 126, 0, 1, &[0x00, 0x01])
                .await,
            Err(ModbusError::InvalidArgument(_))
        ));
        assert!(matches!(
            client
                .read_write_multiple_registers(0, 1, 0, 122, &[0x00, 0x01])
                .await,
            Err(ModbusError::InvalidArgument(_))
        ));
        assert!(transport.sent_frames().is_empty());
    }

    // ===== FIFO queue =====

    #[tokio::test]
    async fn test_read_fifo_queue_returns_values_after_header() {
        let transport = ScriptedTransport::reply_with(&[&[
            0x18, 0x00, 0x06, 0x00, 0x02, 0x01, 0x02, 0x03, 0x04,
        ]]);
        let client = raw_client(transport.clone());
        let result = client.read_fifo_queue(0x04DE).await.unwrap();
        assert_eq!(result, vec![0x01, 0x02, 0x03, 0x04]);
        assert_eq!(transport.sent_frames(), vec![vec![0x18, 0x04, 0xDE]]);
    }

    #[tokio::test]
    async fn test_read_fifo_queue_rejects_short_response() {
        let transport = ScriptedTransport::reply_with(&[&[0x18, 0x00, 0x02, 0x00]]);
        let client = raw_client(transport);
        assert!(matches!(
            client.read_fifo_queue(0x04DE).await,
            Err(ModbusError::Mismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_read_fifo_queue_rejects_inconsistent_byte_count() {
        let transport = ScriptedTransport::reply_with(&[&[
            0x18, 0x00, 0x08, 0x00, 0x02, 0x01, 0x02, 0x03, 0x04,
        ]]);
        let client = raw_client(transport);
        assert!(matches!(
            client.read_fifo_queue(0x04DE).await,
            Err(ModbusError::Mismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_read_fifo_queue_rejects_oversized_fifo_count() {
        // Byte count 66 announces 32 queued registers
        let mut reply = vec![0x18, 0x00, 0x42, 0x00, 0x20];
        reply.extend_from_slice(&[0u8; 64]);
        let transport = ScriptedTransport::reply_with(&[&reply]);
        let client = raw_client(transport);
        assert!(matches!(
            client.read_fifo_queue(0x04DE).await,
            Err(ModbusError::Mismatch(_))
        ));
    }

    // ===== File records =====

    #[tokio::test]
    async fn test_write_file_record_request_layout_and_echo() {
        let echo = [
            0x15, 0x0B, 0x06, 0x00, 0x04, 0x00, 0x01, 0x00, 0x02, 0x0D, 0xFE, 0x00, 0x20,
        ];
        let transport = ScriptedTransport::reply_with(&[&echo]);
        let client = raw_client(transport.clone());

        client
            .write_file_record(4, 1, &[0x0DFE, 0x0020])
            .await
            .unwrap();
        assert_eq!(transport.sent_frames(), vec![echo.to_vec()]);
    }

    #[tokio::test]
    async fn test_write_file_record_argument_validation() {
        let transport = ScriptedTransport::reply_with(&[]);
        let client = raw_client(transport.clone());

        assert!(matches!(
            client.write_file_record(0, 1, &[0x0001]).await,
            Err(ModbusError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.write_file_record(4, 0x2710, &[0x0001]).await,
            Err(ModbusError::InvalidArgument(_))
        ));
        let too_many = vec![0u16; 123];
        assert!(matches!(
            client.write_file_record(4, 1, &too_many).await,
            Err(ModbusError::InvalidArgument(_))
        ));
        assert!(transport.sent_frames().is_empty());
    }

    #[tokio::test]
    async fn test_write_file_record_rejects_mutated_record_data() {
        let mutated = [
            0x15, 0x0B, 0x06, 0x00, 0x04, 0x00, 0x01, 0x00, 0x02, 0x0D, 0xFF, 0x00, 0x20,
        ];
        let transport = ScriptedTransport::reply_with(&[&mutated]);
        let client = raw_client(transport);
        assert!(matches!(
            client.write_file_record(4, 1, &[0x0DFE, 0x0020]).await,
            Err(ModbusError::Mismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_write_file_record_rejects_wrong_reference_type() {
        let bad = [
            0x15, 0x0B, 0x07, 0x00, 0x04, 0x00, 0x01, 0x00, 0x02, 0x0D, 0xFE, 0x00, 0x20,
        ];
        let transport = ScriptedTransport::reply_with(&[&bad]);
        let client = raw_client(transport);
        assert!(matches!(
            client.write_file_record(4, 1, &[0x0DFE, 0x0020]).await,
            Err(ModbusError::Mismatch(_))
        ));
    }

    // ===== Device identification =====

    fn basic_identification_reply() -> Vec<u8> {
        let mut reply = vec![0x2B, 0x0E, 0x01, 0x01, 0x00, 0x00, 0x03];
        reply.extend_from_slice(&[0x00, 0x05]);
        reply.extend_from_slice(b"Vendr");
        reply.extend_from_slice(&[0x01, 0x02]);
        reply.extend_from_slice(b"PC");
        reply.extend_from_slice(&[0x02, 0x03]);
        reply.extend_from_slice(b"1.0");
        reply
    }

    #[tokio::test]
    async fn test_read_device_identification_basic() {
        let reply = basic_identification_reply();
        let transport = ScriptedTransport::reply_with(&[&reply]);
        let client = raw_client(transport.clone());

        let identification = client.read_device_identification_basic().await.unwrap();
        assert_eq!(identification.vendor_name, b"Vendr".to_vec());
        assert_eq!(identification.product_code, b"PC".to_vec());
        assert_eq!(identification.major_minor_revision, b"1.0".to_vec());
        assert_eq!(transport.sent_frames(), vec![vec![0x2B, 0x0E, 0x01, 0x00]]);
    }

    #[tokio::test]
    async fn test_read_device_identification_regular_fills_both_categories() {
        let mut reply = vec![0x2B, 0x0E, 0x02, 0x02, 0x00, 0x00, 0x04];
        reply.extend_from_slice(&[0x00, 0x05]);
        reply.extend_from_slice(b"Vendr");
        reply.extend_from_slice(&[0x01, 0x02]);
        reply.extend_from_slice(b"PC");
        reply.extend_from_slice(&[0x02, 0x03]);
        reply.extend_from_slice(b"1.0");
        reply.extend_from_slice(&[0x04, 0x04]);
        reply.extend_from_slice(b"Pump");
        let transport = ScriptedTransport::reply_with(&[&reply]);
        let client = raw_client(transport);

        let identification = client.read_device_identification_regular().await.unwrap();
        assert_eq!(identification.basic.vendor_name, b"Vendr".to_vec());
        assert_eq!(identification.product_name, b"Pump".to_vec());
        assert!(identification.vendor_url.is_empty());
    }

    #[tokio::test]
    async fn test_read_device_identification_extended_collects_vendor_objects() {
        let mut reply = vec![0x2B, 0x0E, 0x03, 0x03, 0x00, 0x00, 0x02];
        reply.extend_from_slice(&[0x00, 0x05]);
        reply.extend_from_slice(b"Vendr");
        reply.extend_from_slice(&[0x80, 0x03]);
        reply.extend_from_slice(&[0xDE, 0xAD, 0x00]);
        let transport = ScriptedTransport::reply_with(&[&reply]);
        let client = raw_client(transport);

        let identification = client.read_device_identification_extended().await.unwrap();
        assert_eq!(
            identification.regular.basic.vendor_name,
            b"Vendr".to_vec()
        );
        assert_eq!(
            identification.extended_objects.get(&0x80),
            Some(&vec![0xDE, 0xAD, 0x00])
        );
    }

    #[tokio::test]
    async fn test_read_device_identification_specific_object() {
        let mut reply = vec![0x2B, 0x0E, 0x04, 0x01, 0x00, 0x00, 0x01];
        reply.extend_from_slice(&[0x01, 0x02]);
        reply.extend_from_slice(b"PC");
        let transport = ScriptedTransport::reply_with(&[&reply]);
        let client = raw_client(transport.clone());

        let value = client
            .read_device_identification_specific(0x01)
            .await
            .unwrap();
        assert_eq!(value, b"PC".to_vec());
        assert_eq!(transport.sent_frames(), vec![vec![0x2B, 0x0E, 0x04, 0x01]]);
    }

    #[tokio::test]
    async fn test_read_device_identification_rejects_continuation() {
        // More follows with a nonzero next object id
        let mut reply = vec![0x2B, 0x0E, 0x03, 0x03, 0xFF, 0x07, 0x01];
        reply.extend_from_slice(&[0x00, 0x01, b'V']);
        let transport = ScriptedTransport::reply_with(&[&reply]);
        let client = raw_client(transport);
        assert!(matches!(
            client.read_device_identification_extended().await,
            Err(ModbusError::Mismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_read_device_identification_rejects_bad_header_fields() {
        // MEI type mismatch
        let transport =
            ScriptedTransport::reply_with(&[&[0x2B, 0x0D, 0x01, 0x01, 0x00, 0x00, 0x00]]);
        let client = raw_client(transport);
        assert!(matches!(
            client.read_device_identification_basic().await,
            Err(ModbusError::Mismatch(_))
        ));

        // Device id code mismatch
        let transport =
            ScriptedTransport::reply_with(&[&[0x2B, 0x0E, 0x02, 0x01, 0x00, 0x00, 0x00]]);
        let client = raw_client(transport);
        assert!(matches!(
            client.read_device_identification_basic().await,
            Err(ModbusError::Mismatch(_))
        ));

        // Conformity level with low bits above 3
        let transport =
            ScriptedTransport::reply_with(&[&[0x2B, 0x0E, 0x01, 0x05, 0x00, 0x00, 0x00]]);
        let client = raw_client(transport);
        assert!(matches!(
            client.read_device_identification_basic().await,
            Err(ModbusError::Mismatch(_))
        ));

        // More-follows flag outside {0x00, 0xFF}
        let transport =
            ScriptedTransport::reply_with(&[&[0x2B, 0x0E, 0x01, 0x01, 0x05, 0x00, 0x00]]);
        let client = raw_client(transport);
        assert!(matches!(
            client.read_device_identification_basic().await,
            Err(ModbusError::Mismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_read_device_identification_rejects_truncated_objects() {
        let mut reply = vec![0x2B, 0x0E, 0x01, 0x01, 0x00, 0x00, 0x01];
        reply.extend_from_slice(&[0x00, 0x05, b'V']);
        let transport = ScriptedTransport::reply_with(&[&reply]);
        let client = raw_client(transport);
        assert!(matches!(
            client.read_device_identification_basic().await,
            Err(ModbusError::Mismatch(_))
        ));
    }

    // ===== Through a real codec =====

    #[tokio::test]
    async fn test_write_single_coil_over_rtu_framing() {
        let echo: &[u8] = &[0x11, 0x05, 0x00, 0xAC, 0xFF, 0x00, 0x4E, 0x8B];
        let transport = ScriptedTransport::reply_with(&[echo]);
        let client = ModbusClient::from_parts(Arc::new(RtuCodec::new(0x11)), transport.clone());

        let result = client.write_single_coil(0x00AC, COIL_ON).await.unwrap();
        assert_eq!(result, vec![0xFF, 0x00]);
        assert_eq!(transport.sent_frames(), vec![echo.to_vec()]);
    }

    #[tokio::test]
    async fn test_reply_from_wrong_slave_is_a_frame_error() {
        let reply = RtuCodec::new(0x12)
            .encode(&ModbusPdu::new(0x05, vec![0x00, 0xAC, 0xFF, 0x00]))
            .unwrap();
        let transport = ScriptedTransport::reply_with(&[&reply]);
        let client = ModbusClient::from_parts(Arc::new(RtuCodec::new(0x11)), transport);

        assert!(matches!(
            client.write_single_coil(0x00AC, COIL_ON).await,
            Err(ModbusError::Frame(_))
        ));
    }
}
