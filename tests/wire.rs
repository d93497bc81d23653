//! Tests for the wire formats, including a full delta-exchange round trip
//! between two job logs.

mod common;

use bytes::BytesMut;
use causalog::wire::{
    decode_delta_list, decode_determinant_request, decode_determinant_response,
    encode_delta_list, encode_determinant_request, encode_determinant_response,
};
use causalog::{
    ConsumerId, Determinant, DeterminantRequest, EpochId, TimerCallback, VertexId,
};
use common::{encoded, job_log, job_log_for, local_vertex, partition};

#[test]
fn piggybacked_deltas_survive_the_wire() {
    // producer-side job log appends; its deltas are framed, shipped, and
    // folded into the consumer-side job log's upstream view
    let producer = job_log(-1, &[]);
    let consumer_channel = ConsumerId::new(1);
    producer.register_downstream_consumer(consumer_channel, partition(), 0);

    let epoch = EpochId::new(3);
    let determinants = [
        Determinant::Rng(7),
        Determinant::timer(1_000, TimerCallback::Latency),
        Determinant::source_checkpoint(250),
    ];
    {
        let lock = producer.vertex_lock().clone();
        let guard = lock.lock();
        for determinant in &determinants {
            producer.append_determinant(determinant, epoch, &guard).unwrap();
        }
        producer
            .append_subpartition_determinant(
                &Determinant::Buffer { sequence: 1, kind: 2 },
                epoch,
                partition(),
                0,
                &guard,
            )
            .unwrap();
    }

    let outbound = producer.next_deltas_for_downstream(consumer_channel, epoch);
    assert!(!outbound.is_empty());

    let mut frame = BytesMut::new();
    encode_delta_list(&outbound, &mut frame);

    // receiver side
    let mut slice: &[u8] = &frame;
    let inbound = decode_delta_list(&mut slice).unwrap();
    assert!(slice.is_empty());
    assert_eq!(inbound, outbound);

    let receiver = job_log_for(VertexId::new(0x11), -1, &[(local_vertex(), -1)]);
    for delta in &inbound {
        receiver.process_upstream_vertex_delta(delta).unwrap();
    }

    // the receiver now serves the producer's determinants onward
    let downstream = ConsumerId::new(2);
    receiver.register_downstream_consumer(downstream, partition(), 0);
    let forwarded = receiver.next_deltas_for_downstream(downstream, epoch);
    let from_producer = forwarded
        .iter()
        .find(|d| d.vertex == local_vertex())
        .expect("producer's delta forwarded");
    assert_eq!(
        &from_producer.main.as_ref().unwrap().bytes[..],
        &encoded(&determinants)[..]
    );
    assert_eq!(
        &from_producer.partitions[&partition()][&0].bytes[..],
        &encoded(&[Determinant::Buffer { sequence: 1, kind: 2 }])[..]
    );
}

#[test]
fn recovery_round_trip_over_the_wire() {
    let replica = job_log(-1, &[(VertexId::new(0x55), -1)]);
    let upstream = VertexId::new(0x55);
    {
        // feed the replica some upstream bytes via the wire path
        let producer = job_log(-1, &[]);
        let channel = ConsumerId::new(1);
        producer.register_downstream_consumer(channel, partition(), 0);
        // (the producer here stands in for vertex 0x55)
        let lock = producer.vertex_lock().clone();
        let guard = lock.lock();
        producer
            .append_determinant(&Determinant::Rng(21), EpochId::new(1), &guard)
            .unwrap();
        drop(guard);
        let mut deltas = producer.next_deltas_for_downstream(channel, EpochId::new(1));
        for delta in &mut deltas {
            delta.vertex = upstream;
            replica.process_upstream_vertex_delta(delta).unwrap();
        }
    }

    // a recovering standby asks for everything from epoch 0
    let request = DeterminantRequest::new(upstream, EpochId::new(0));
    let mut request_frame = BytesMut::new();
    encode_determinant_request(&request, &mut request_frame);
    assert_eq!(request_frame.len(), 24);

    let mut slice: &[u8] = &request_frame;
    let decoded_request = decode_determinant_request(&mut slice).unwrap();
    assert_eq!(decoded_request, request);

    let response =
        replica.respond_to_determinant_request(decoded_request.vertex, decoded_request.start_epoch);
    assert!(response.found);

    let mut response_frame = BytesMut::new();
    encode_determinant_response(&response, &mut response_frame);
    let mut slice: &[u8] = &response_frame;
    let decoded_response = decode_determinant_response(&mut slice).unwrap();
    assert_eq!(decoded_response, response);
    assert_eq!(
        &decoded_response.payload.unwrap().main.unwrap().bytes[..],
        &encoded(&[Determinant::Rng(21)])[..]
    );
}

#[test]
fn negative_response_round_trip() {
    let replica = job_log(1, &[(VertexId::new(0x55), -2)]);
    let response = replica.respond_to_determinant_request(VertexId::new(0x55), EpochId::new(0));
    assert!(!response.found);

    let mut frame = BytesMut::new();
    encode_determinant_response(&response, &mut frame);
    let mut slice: &[u8] = &frame;
    assert_eq!(decode_determinant_response(&mut slice).unwrap(), response);
}
