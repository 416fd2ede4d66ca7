use super::*;

fn host(shape: [usize; 3], origin: [usize; 3]) -> Storage<f64> {
    Storage::host_only(shape, origin).unwrap()
}

/// A storage whose "device" is a [`HostMirror`], so transfers are observable.
fn mirrored(shape: [usize; 3]) -> Storage<f32> {
    let mut s = Storage::<f32>::host_only(shape, [0, 0, 0]).unwrap();
    let bytes = s.layout().span_len() * 4;
    s.attach_device(Box::new(HostMirror::new(bytes))).unwrap();
    s
}

fn mirror(s: &Storage<f32>) -> &HostMirror {
    s.device_buffer()
        .and_then(|d| d.as_any().downcast_ref::<HostMirror>())
        .unwrap()
}

#[test]
fn test_origin_is_aligned() {
    for origin in [[0, 0, 0], [1, 2, 3], [3, 0, 5]] {
        let s = host([6, 5, 7], origin);
        let addr = s.host_ptr() as usize + s.layout().linear(origin) * 8;
        assert_eq!(addr % ALIGNMENT, 0, "origin {:?}", origin);

        let s = Storage::<f32>::host_only([6, 5, 7], origin).unwrap();
        let addr = s.host_ptr() as usize + s.layout().linear(origin) * 4;
        assert_eq!(addr % ALIGNMENT, 0, "origin {:?}", origin);
    }
}

#[test]
fn test_layout_pads_the_contiguous_axis() {
    let layout = Layout::new([4, 3, 5], [0, 0, 0], 8).unwrap();
    // 64 bytes hold 8 doubles, so k is padded from 5 to 8.
    assert_eq!(layout.strides, [24, 8, 1]);
    assert_eq!(layout.span_len(), 96);
    assert_eq!(layout.linear([1, 2, 3]), 24 + 16 + 3);

    let layout = Layout::new([2, 2, 17], [0, 0, 0], 4).unwrap();
    assert_eq!(layout.strides[1], 32);
}

#[test]
fn test_invalid_shape_and_origin() {
    assert!(matches!(
        Storage::<f64>::host_only([0, 3, 3], [0, 0, 0]),
        Err(StorageError::InvalidShape([0, 3, 3]))
    ));
    assert!(matches!(
        Storage::<f64>::host_only([3, 3, 3], [1, 3, 0]),
        Err(StorageError::InvalidOrigin { .. })
    ));
}

#[test]
fn test_get_set_fill() {
    let mut s = host([3, 4, 5], [1, 1, 0]);
    assert_eq!(s.get([2, 3, 4]).unwrap(), 0.0);
    s.set([2, 3, 4], 7.5).unwrap();
    assert_eq!(s.get([2, 3, 4]).unwrap(), 7.5);
    s.fill(1.0).unwrap();
    assert!(s.to_array().unwrap().iter().all(|&v| v == 1.0));
}

#[test]
#[should_panic(expected = "outside shape")]
fn test_get_out_of_shape_panics() {
    let mut s = host([2, 2, 2], [0, 0, 0]);
    let _ = s.get([2, 0, 0]);
}

#[test]
fn test_from_array_preserves_values() {
    let array = Array3::from_shape_fn((3, 2, 4), |(i, j, k)| (i * 100 + j * 10 + k) as f64);
    let mut s = Storage::from_array(Backend::Reference, array.view(), [0, 0, 0]).unwrap();
    assert_eq!(s.shape(), [3, 2, 4]);
    assert_eq!(s.get([2, 1, 3]).unwrap(), 213.0);
    assert_eq!(s.to_array().unwrap(), array);
    // Host backends never get a device copy.
    assert!(!s.has_device());
    assert_eq!(s.coherence(), Coherence::Clean);
}

#[test]
fn test_regions() {
    let array = Array3::from_shape_fn((4, 4, 4), |(i, j, k)| (i + j + k) as f64);
    let mut s = Storage::<f32>::from_array(
        Backend::Vectorized,
        array.mapv(|v| v as f32).view(),
        [0, 0, 0],
    )
    .unwrap();

    let region = s.read_region([1, 1, 1], [2, 2, 3]);
    assert_eq!(region.dim(), (2, 2, 3));
    assert_eq!(region[[0, 0, 0]], 3.0);
    assert_eq!(region[[1, 1, 2]], 7.0);

    let values = Array3::from_elem((2, 1, 2), -1.0);
    s.write_region([2, 3, 2], values.view());
    assert_eq!(s.get([3, 3, 3]).unwrap(), -1.0);
    assert_eq!(s.get([3, 3, 1]).unwrap(), 7.0);
}

#[test]
fn test_attach_device_rejects_wrong_size() {
    let mut s = Storage::<f32>::host_only([2, 2, 2], [0, 0, 0]).unwrap();
    assert!(matches!(
        s.attach_device(Box::new(HostMirror::new(4))),
        Err(StorageError::Transfer(_))
    ));
}

#[test]
fn test_sync_device_without_device_fails() {
    let mut s = host([2, 2, 2], [0, 0, 0]);
    assert!(matches!(
        s.sync_device(),
        Err(StorageError::DeviceUnavailable(_))
    ));
    // Host writes on a host-only storage never dirty anything.
    s.set([0, 0, 0], 1.0).unwrap();
    assert_eq!(s.coherence(), Coherence::Clean);
}

#[test]
fn test_host_write_then_device_read_transfers_once() {
    let mut s = mirrored([2, 3, 4]);
    assert_eq!(s.coherence(), Coherence::Clean);

    s.set([1, 2, 3], 5.0).unwrap();
    s.set([0, 0, 0], 2.0).unwrap();
    assert_eq!(s.coherence(), Coherence::HostDirty);
    assert_eq!(s.transfers().total(), 0);

    s.read_device().unwrap();
    s.read_device().unwrap();
    assert_eq!(s.coherence(), Coherence::Clean);
    assert_eq!(s.transfers().host_to_device, 1);

    let at = s.layout().linear([1, 2, 3]);
    assert_eq!(mirror(&s).as_slice::<f32>()[at], 5.0);
}

#[test]
fn test_device_write_then_host_read_transfers_once() {
    let mut s = mirrored([2, 2, 3]);
    let at = s.layout().linear([1, 1, 2]);
    {
        let device = s.write_device().unwrap();
        let mirror = device.as_any_mut().downcast_mut::<HostMirror>().unwrap();
        mirror.as_slice_mut::<f32>()[at] = 9.0;
    }
    assert_eq!(s.coherence(), Coherence::DeviceDirty);

    assert_eq!(s.get([1, 1, 2]).unwrap(), 9.0);
    assert_eq!(s.get([0, 0, 0]).unwrap(), 0.0);
    assert_eq!(s.coherence(), Coherence::Clean);
    assert_eq!(s.transfers().device_to_host, 1);
    assert_eq!(s.transfers().host_to_device, 0);
}

#[test]
fn test_clean_storage_never_transfers() {
    let mut s = mirrored([2, 2, 2]);
    s.read_device().unwrap();
    s.read_host().unwrap();
    s.sync_host().unwrap();
    s.sync_device().unwrap();
    assert_eq!(s.transfers().total(), 0);
}

#[test]
fn test_host_write_after_device_write_pulls_first() {
    let mut s = mirrored([1, 1, 2]);
    {
        let device = s.write_device().unwrap();
        let mirror = device.as_any_mut().downcast_mut::<HostMirror>().unwrap();
        mirror.as_slice_mut::<f32>()[1] = 3.0;
    }
    // Writing one host element must not lose the device's other element.
    s.set([0, 0, 0], 1.0).unwrap();
    assert_eq!(s.coherence(), Coherence::HostDirty);
    assert_eq!(s.get([0, 0, 1]).unwrap(), 3.0);
    s.read_device().unwrap();
    assert_eq!(mirror(&s).as_slice::<f32>()[..2], [1.0, 3.0]);
}
