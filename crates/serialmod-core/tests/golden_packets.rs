use serialmod_core::encoding::Writer;
use serialmod_core::frame::{self, FramingMode};
use serialmod_core::pdu::{ExceptionCode, RegisterData, Request, Response};
use serialmod_core::{DecodeError, EncodeError};

const READ_HOLDING_REQ: &[u8] = &[0x03, 0x00, 0x6B, 0x00, 0x03];
const READ_HOLDING_RTU: &[u8] = &[0x11, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x76, 0x87];
const READ_HOLDING_ASCII: &[u8] = b":1103006B00037E\r\n";
const READ_HOLDING_RESP_RTU: &[u8] = &[
    0x11, 0x03, 0x06, 0xAE, 0x41, 0x56, 0x52, 0x43, 0x40, 0x49, 0xAD,
];

fn encode(mode: FramingMode, address: u8, pdu: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let mut buf = [0u8; frame::ascii::MAX_FRAME_LEN];
    let mut w = Writer::new(&mut buf);
    mode.encode(&mut w, address, pdu)?;
    Ok(w.as_written().to_vec())
}

#[test]
fn fc03_request_golden_rtu() {
    let mut pdu = [0u8; 8];
    let mut w = Writer::new(&mut pdu);
    Request::ReadHoldingRegisters {
        start: 0x006B,
        quantity: 3,
    }
    .encode(&mut w)
    .unwrap();
    assert_eq!(w.as_written(), READ_HOLDING_REQ);

    assert_eq!(encode(FramingMode::Rtu, 0x11, READ_HOLDING_REQ).unwrap(), READ_HOLDING_RTU);
}

#[test]
fn fc03_request_golden_ascii() {
    assert_eq!(
        encode(FramingMode::Ascii, 0x11, READ_HOLDING_REQ).unwrap(),
        READ_HOLDING_ASCII
    );
}

#[test]
fn fc03_response_golden_rtu() {
    let (address, pdu) = frame::rtu::decode_frame(READ_HOLDING_RESP_RTU).unwrap();
    assert_eq!(address, 0x11);

    let Response::Data { data, .. } = Response::decode(pdu).unwrap() else {
        panic!("expected data response");
    };
    let registers = RegisterData::parse(data).unwrap();
    assert_eq!(registers.iter().collect::<Vec<_>>(), vec![0xAE41, 0x5652, 0x4340]);
}

#[test]
fn rtu_tamper_detected_as_checksum_error() {
    let mut tampered = READ_HOLDING_RTU.to_vec();
    tampered[2] ^= 0x01;

    let err = frame::rtu::decode_frame(&tampered).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidCrc { .. }));
    assert!(err.is_checksum());
}

#[test]
fn ascii_bad_envelope_is_framing_error() {
    let mut scratch = [0u8; frame::ascii::MAX_DECODED_LEN];
    let err = FramingMode::Ascii
        .decode(b":1103006B00037E", &mut scratch)
        .unwrap_err();
    assert!(err.is_framing());
}

#[test]
fn exception_response_over_rtu() {
    let wire = encode(FramingMode::Rtu, 0x0A, &[0x83, 0x02]).unwrap();
    let (address, pdu) = frame::rtu::decode_frame(&wire).unwrap();
    assert_eq!(address, 0x0A);
    let Response::Exception(exception) = Response::decode(pdu).unwrap() else {
        panic!("expected exception response");
    };
    assert_eq!(exception.exception_code, ExceptionCode::IllegalDataAddress);
}

#[test]
fn pdu_size_limit_applies_to_both_framings() {
    let mut pdu = vec![0u8; 253];
    pdu[0] = 0x10;
    assert_eq!(encode(FramingMode::Rtu, 1, &pdu).unwrap().len(), 256);
    assert_eq!(encode(FramingMode::Ascii, 1, &pdu).unwrap().len(), 513);

    pdu.push(0);
    for mode in [FramingMode::Rtu, FramingMode::Ascii] {
        assert_eq!(
            encode(mode, 1, &pdu).unwrap_err(),
            EncodeError::PduTooLarge { len: 254 }
        );
    }
}
