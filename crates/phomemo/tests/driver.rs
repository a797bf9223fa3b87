use std::time::Duration;

use image::{DynamicImage, GrayImage, Luma};
use phomemo::protocol::{PrintJob, commands};
use phomemo::transport::{MockHandle, MockTransport};
use phomemo::{
    DriverOptions, PackedBitmap, PixelBitmap, PrintOptions, Printer, PrinterError, PrinterState,
};

type MockPrinter = Printer<MockTransport>;

/// Let spawned tasks run until they block.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// A connected printer with paper loaded and the connect-time polls cleared.
async fn connected(options: DriverOptions) -> (MockPrinter, MockHandle) {
    let (link, handle) = MockTransport::link();
    let printer = Printer::new(options);

    let connecting = tokio::spawn({
        let printer = printer.clone();
        async move { printer.connect(link).await }
    });
    handle.paper(true).await;
    assert_eq!(connecting.await.unwrap().unwrap(), PrinterState::Ready);

    settle().await;
    handle.take_writes();
    (printer, handle)
}

fn spawn_print(
    printer: &MockPrinter,
    bitmap: PixelBitmap,
) -> tokio::task::JoinHandle<phomemo::Result<()>> {
    let printer = printer.clone();
    tokio::spawn(async move { printer.print(&bitmap).await })
}

fn bitmap(width: usize, height: usize) -> PixelBitmap {
    let pixels = (0..width * height).map(|i| (i % 3 == 0) as u8).collect();
    PixelBitmap::new(width, height, pixels).unwrap()
}

fn expected_segments(bitmap: &PixelBitmap) -> Vec<Vec<u8>> {
    let packed = PackedBitmap::pack(bitmap).unwrap();
    PrintJob::encode(&packed, &PrintOptions::default())
        .unwrap()
        .segments()
        .iter()
        .map(|s| s.to_vec())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_connect_resolves_to_ready() {
    let (link, handle) = MockTransport::link();
    let printer: MockPrinter = Printer::default();
    assert!(!printer.is_connected());

    handle.paper(true).await;
    let state = printer.connect(link).await.unwrap();

    assert_eq!(state, PrinterState::Ready);
    assert_eq!(printer.state(), PrinterState::Ready);
    assert!(printer.is_connected());

    settle().await;
    assert!(handle.writes().contains(&commands::status_poll()));
}

#[tokio::test(start_paused = true)]
async fn test_connect_resolves_to_out_of_paper() {
    let (link, handle) = MockTransport::link();
    let printer: MockPrinter = Printer::default();

    handle.paper(false).await;
    assert_eq!(
        printer.connect(link).await.unwrap(),
        PrinterState::OutOfPaper
    );
    assert!(printer.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_connect_fails_when_link_drops() {
    let (link, handle) = MockTransport::link();
    let printer: MockPrinter = Printer::default();

    handle.disconnect().await;
    let result = printer.connect(link).await;

    assert!(matches!(result, Err(PrinterError::ConnectionLost)));
    assert_eq!(printer.state(), PrinterState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_connect_times_out_without_status() {
    let (link, handle) = MockTransport::link();
    let printer: MockPrinter =
        Printer::new(DriverOptions::new().with_connect_timeout(Duration::from_secs(5)));

    let result = printer.connect(link).await;

    assert!(matches!(result, Err(PrinterError::ConnectTimeout(5))));
    assert_eq!(printer.state(), PrinterState::Disconnected);
    assert!(handle.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_second_connect_is_rejected() {
    let (printer, _handle) = connected(DriverOptions::default()).await;
    let (link, second) = MockTransport::link();

    assert!(matches!(
        printer.connect(link).await,
        Err(PrinterError::AlreadyConnected)
    ));
    assert!(second.is_closed());
    assert_eq!(printer.state(), PrinterState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_print_writes_job_and_waits_for_finish() {
    let (printer, handle) = connected(DriverOptions::default()).await;
    let image = bitmap(16, 3);
    let expected = expected_segments(&image);

    let job = spawn_print(&printer, image);
    settle().await;

    assert_eq!(printer.state(), PrinterState::Busy);
    assert_eq!(handle.writes(), expected);
    assert!(!job.is_finished());

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.finished().await;

    job.await.unwrap().unwrap();
    assert_eq!(printer.state(), PrinterState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_early_finish_signal_is_ignored() {
    let (printer, handle) = connected(DriverOptions::default()).await;

    let job = spawn_print(&printer, bitmap(8, 8));
    settle().await;

    // Inside the grace window right after the transfer.
    handle.finished().await;
    settle().await;
    assert!(!job.is_finished());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!job.is_finished());
    assert_eq!(printer.state(), PrinterState::Busy);

    handle.finished().await;
    job.await.unwrap().unwrap();
    assert_eq!(printer.state(), PrinterState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_print_rejected_while_busy() {
    let (printer, handle) = connected(DriverOptions::default()).await;

    let job = spawn_print(&printer, bitmap(8, 4));
    settle().await;
    let written = handle.writes().len();

    let result = printer.print(&bitmap(8, 4)).await;
    assert!(matches!(
        result,
        Err(PrinterError::NotReady(PrinterState::Busy))
    ));
    assert_eq!(handle.writes().len(), written);

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.finished().await;
    job.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_print_rejected_when_disconnected() {
    let printer: MockPrinter = Printer::default();
    assert!(matches!(
        printer.print(&bitmap(8, 1)).await,
        Err(PrinterError::NotReady(PrinterState::Disconnected))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_oversized_bitmap_rejected_before_writing() {
    let (printer, handle) = connected(DriverOptions::default()).await;

    let result = printer.print(&bitmap(400, 2)).await;

    assert!(matches!(
        result,
        Err(PrinterError::BitmapTooWide { stride: 50, max: 48 })
    ));
    assert!(handle.writes().is_empty());
    assert_eq!(printer.state(), PrinterState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_tall_bitmap_is_sent_in_chunks() {
    let (printer, handle) = connected(DriverOptions::default()).await;

    let job = spawn_print(&printer, bitmap(8, 300));
    settle().await;

    let writes = handle.writes();
    assert_eq!(writes.len(), 8);
    assert_eq!(writes[3], commands::bitmap_header(1, 256).to_vec());
    assert_eq!(writes[4].len(), 256);
    assert_eq!(writes[5], commands::bitmap_header(1, 44).to_vec());
    assert_eq!(writes[6].len(), 44);
    assert_eq!(writes[7], commands::feed_lines(4).to_vec());

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.finished().await;
    job.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_print_image_uses_black_point() {
    let (printer, handle) = connected(DriverOptions::default()).await;
    let gray = GrayImage::from_fn(16, 2, |x, _| if x < 8 { Luma([0]) } else { Luma([255]) });
    let image = DynamicImage::ImageLuma8(gray);

    let job = tokio::spawn({
        let printer = printer.clone();
        async move { printer.print_image(&image).await }
    });
    settle().await;

    let writes = handle.writes();
    assert_eq!(writes[3], commands::bitmap_header(2, 2).to_vec());
    assert_eq!(writes[4], vec![0xff, 0x00, 0xff, 0x00]);

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.finished().await;
    job.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_paper_out_rejects_print() {
    let (printer, handle) = connected(DriverOptions::default()).await;

    handle.paper(false).await;
    settle().await;
    assert_eq!(printer.state(), PrinterState::OutOfPaper);

    assert!(matches!(
        printer.print(&bitmap(8, 1)).await,
        Err(PrinterError::NotReady(PrinterState::OutOfPaper))
    ));
    assert!(handle.writes().is_empty());

    handle.paper(true).await;
    settle().await;
    assert_eq!(printer.state(), PrinterState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_paper_out_during_print_survives_finish() {
    let (printer, handle) = connected(DriverOptions::default()).await;

    let job = spawn_print(&printer, bitmap(8, 4));
    settle().await;

    // Paper loaded while busy does not release the printer early.
    handle.paper(true).await;
    settle().await;
    assert_eq!(printer.state(), PrinterState::Busy);

    handle.paper(false).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.finished().await;

    job.await.unwrap().unwrap();
    assert_eq!(printer.state(), PrinterState::OutOfPaper);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_print_fails_print() {
    let (printer, handle) = connected(DriverOptions::default()).await;

    let job = spawn_print(&printer, bitmap(8, 4));
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.disconnect().await;

    assert!(matches!(
        job.await.unwrap(),
        Err(PrinterError::PrintIncomplete)
    ));
    assert_eq!(printer.state(), PrinterState::Disconnected);
    assert!(!printer.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_print_timeout_drops_connection() {
    let options = DriverOptions::new().with_print_timeout(Duration::from_secs(30));
    let (printer, handle) = connected(options).await;
    let image = bitmap(8, 4);
    let expected = expected_segments(&image);

    let result = printer.print(&image).await;

    assert!(matches!(result, Err(PrinterError::PrintTimeout(30))));
    assert_eq!(printer.state(), PrinterState::Disconnected);
    assert!(handle.is_closed());
    // Background polls were skipped for the whole print.
    assert_eq!(handle.writes(), expected);
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_releases_printer() {
    let (printer, handle) = connected(DriverOptions::default()).await;
    handle.set_fail_writes(true);

    let result = printer.print(&bitmap(8, 1)).await;

    assert!(matches!(result, Err(PrinterError::Write(_))));
    assert_eq!(printer.state(), PrinterState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_status_poll_never_interleaves_print() {
    let (printer, handle) = connected(DriverOptions::default()).await;
    handle.set_write_delay(Duration::from_millis(5));
    let image = bitmap(8, 600);
    let expected = expected_segments(&image);

    let poll = tokio::spawn({
        let printer = printer.clone();
        async move { printer.refresh_status().await }
    });
    settle().await;

    // The poll is mid-write and holds the lock; the print has to wait.
    let job = spawn_print(&printer, image);
    settle().await;
    assert_eq!(printer.state(), PrinterState::Busy);

    // Neither an explicit refresh nor a ready signal may write now.
    assert!(matches!(
        printer.refresh_status().await,
        Err(PrinterError::NotReady(PrinterState::Busy))
    ));
    handle.notify(&[0x02, 0xb6, 0x00]).await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.finished().await;
    job.await.unwrap().unwrap();
    poll.await.unwrap().unwrap();

    let mut want = vec![commands::status_poll()];
    want.extend(expected);
    assert_eq!(handle.writes(), want);
}

#[tokio::test(start_paused = true)]
async fn test_background_poll_runs_on_interval() {
    let (_printer, handle) = connected(DriverOptions::default()).await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(handle.writes().is_empty());

    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(handle.take_writes(), vec![commands::status_poll()]);
}

#[tokio::test(start_paused = true)]
async fn test_ready_signal_triggers_poll() {
    let (_printer, handle) = connected(DriverOptions::default()).await;

    handle.notify(&[0x02, 0xb6, 0x00]).await;
    settle().await;

    assert_eq!(handle.writes(), vec![commands::status_poll()]);
}

#[tokio::test(start_paused = true)]
async fn test_notifications_update_info() {
    let (printer, handle) = connected(DriverOptions::default()).await;

    handle.notify(&[0x1a, 0x04, 0x5a]).await;
    handle.notify(&[0x1a, 0x07, 0x01, 0x02, 0x03]).await;
    handle.notify(&[0xde, 0xad, 0xbe, 0xef]).await;
    settle().await;

    let info = printer.info();
    assert_eq!(info.battery_level, 90);
    assert_eq!(info.firmware_version, "1.2.3");
    assert_eq!(info.state, PrinterState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_link_drop_resets_info() {
    let (printer, handle) = connected(DriverOptions::default()).await;
    handle.notify(&[0x1a, 0x04, 0x40]).await;
    handle.disconnect().await;
    settle().await;

    assert_eq!(printer.info(), phomemo::DeviceInfo::default());

    let (link, handle) = MockTransport::link();
    handle.paper(true).await;
    assert_eq!(printer.connect(link).await.unwrap(), PrinterState::Ready);
    assert_eq!(printer.info().battery_level, -1);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_disconnect_closes_link() {
    let (printer, handle) = connected(DriverOptions::default()).await;

    printer.disconnect().await.unwrap();

    assert!(handle.is_closed());
    assert_eq!(printer.state(), PrinterState::Disconnected);
    assert!(matches!(
        printer.refresh_status().await,
        Err(PrinterError::NotReady(PrinterState::Disconnected))
    ));
}
